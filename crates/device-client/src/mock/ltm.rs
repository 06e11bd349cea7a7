//! LTM object operations for MockDeviceClient
//!
//! Handles virtual addresses, listeners, pools, members, monitors and L7
//! objects, plus their statistics and live member health.

use super::MockDeviceClient;
use crate::error::DeviceError;
use crate::models::*;
use std::collections::BTreeSet;

fn object_key(device: &Device, kind: ObjectKind, partition: &str, name: &str) -> super::ObjectKey {
    (device.hostname.clone(), kind, partition.to_string(), name.to_string())
}

fn path(kind: ObjectKind, partition: &str, name: &str) -> String {
    format!("{}:/{}/{}", kind, partition, name)
}

pub fn get_object(client: &MockDeviceClient, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<LtmObject, DeviceError> {
    let target = path(kind, partition, name);
    client.record(device, "get_object", &target)?;
    client.objects
        .lock()
        .unwrap()
        .get(&object_key(device, kind, partition, name))
        .cloned()
        .ok_or_else(|| DeviceError::NotFound(format!("{} not found on {}", target, device)))
}

pub fn create_object(client: &MockDeviceClient, device: &Device, object: &LtmObject) -> Result<(), DeviceError> {
    let target = object.full_path();
    client.record(device, "create_object", &target)?;

    let mut objects = client.objects.lock().unwrap();
    let key = object_key(device, object.kind, &object.partition, &object.name);
    if objects.contains_key(&key) {
        return Err(DeviceError::Conflict(format!("{} already exists on {}", target, device)));
    }
    objects.insert(key, object.clone());
    client.mutated();
    Ok(())
}

pub fn update_object(client: &MockDeviceClient, device: &Device, object: &LtmObject) -> Result<(), DeviceError> {
    let target = object.full_path();
    client.record(device, "update_object", &target)?;

    let mut objects = client.objects.lock().unwrap();
    let key = object_key(device, object.kind, &object.partition, &object.name);
    let stored = objects
        .get_mut(&key)
        .ok_or_else(|| DeviceError::NotFound(format!("{} not found on {}", target, device)))?;

    let merged = merge_body(&stored.body, &object.body);
    if merged != stored.body {
        stored.body = merged;
        client.mutated();
    }
    Ok(())
}

pub fn delete_object(client: &MockDeviceClient, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<(), DeviceError> {
    let target = path(kind, partition, name);
    client.record(device, "delete_object", &target)?;

    let key = object_key(device, kind, partition, name);
    if client.objects.lock().unwrap().remove(&key).is_none() {
        return Err(DeviceError::NotFound(format!("{} not found on {}", target, device)));
    }
    client.stats.lock().unwrap().remove(&key);
    client.mutated();
    Ok(())
}

pub fn object_stats(
    client: &MockDeviceClient,
    device: &Device,
    kind: ObjectKind,
    partition: &str,
    name: &str,
    keys: &[String],
) -> Result<ObjectStats, DeviceError> {
    let target = path(kind, partition, name);
    client.record(device, "object_stats", &target)?;

    let key = object_key(device, kind, partition, name);
    if !client.objects.lock().unwrap().contains_key(&key) {
        return Err(DeviceError::NotFound(format!("{} not found on {}", target, device)));
    }
    let stats = client.stats.lock().unwrap();
    let seeded = stats.get(&key);
    Ok(keys
        .iter()
        .map(|k| {
            let value = seeded.and_then(|s| s.get(k)).copied().unwrap_or(0);
            (k.clone(), value)
        })
        .collect())
}

pub fn member_state(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<MemberState, DeviceError> {
    let target = path(ObjectKind::Member, partition, name);
    client.record(device, "member_state", &target)?;

    if !client.objects.lock().unwrap().contains_key(&object_key(device, ObjectKind::Member, partition, name)) {
        return Err(DeviceError::NotFound(format!("{} not found on {}", target, device)));
    }
    Ok(client.member_states
        .lock()
        .unwrap()
        .get(&(device.hostname.clone(), partition.to_string(), name.to_string()))
        .cloned()
        .unwrap_or_default())
}

/// Distinct `address` attributes of all objects of a kind in a partition
pub fn addresses_of_kind(
    client: &MockDeviceClient,
    device: &Device,
    kind: ObjectKind,
    partition: &str,
    operation: &str,
) -> Result<Vec<String>, DeviceError> {
    client.record(device, operation, partition)?;

    let addresses: BTreeSet<String> = client.objects
        .lock()
        .unwrap()
        .iter()
        .filter(|((d, k, p, _), _)| *d == device.hostname && *k == kind && p == partition)
        .filter_map(|(_, object)| object.body.get("address").and_then(|a| a.as_str()).map(str::to_string))
        .collect();
    Ok(addresses.into_iter().collect())
}

/// Merge `patch` into `base`: keys are overwritten, `null` removes a key
fn merge_body(base: &serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
    let mut merged = base.clone();
    match (merged.as_object_mut(), patch.as_object()) {
        (Some(target), Some(changes)) => {
            for (key, value) in changes {
                if value.is_null() {
                    target.remove(key);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
            merged
        }
        _ => patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_body_overwrites_and_removes() {
        let base = json!({"lb_method": "ROUND_ROBIN", "persist": "cookie"});
        let patch = json!({"lb_method": "LEAST_CONNECTIONS", "persist": null});
        assert_eq!(merge_body(&base, &patch), json!({"lb_method": "LEAST_CONNECTIONS"}));
    }

    #[test]
    fn test_merge_body_identical_patch_is_unchanged() {
        let base = json!({"address": "10.0.0.5%2", "enabled": true});
        assert_eq!(merge_body(&base, &base), base);
    }
}
