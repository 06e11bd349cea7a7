//! Network operations for MockDeviceClient
//!
//! Handles route domains, VLANs and tunnels, FDB entries and self-IPs

use super::MockDeviceClient;
use crate::error::DeviceError;
use crate::models::*;

fn next_route_domain_id(client: &MockDeviceClient, device: &Device) -> u32 {
    client.route_domains
        .lock()
        .unwrap()
        .keys()
        .filter(|(d, _)| *d == device.hostname)
        .map(|(_, id)| *id)
        .max()
        .map_or(1, |id| id + 1)
}

pub fn get_route_domain(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<RouteDomain, DeviceError> {
    client.record(device, "get_route_domain", &format!("/{}/{}", partition, name))?;

    let existing = client.route_domains
        .lock()
        .unwrap()
        .iter()
        .find(|((d, _), rd)| *d == device.hostname && rd.partition == partition && rd.name == name)
        .map(|(_, rd)| rd.clone());
    if let Some(rd) = existing {
        return Ok(rd);
    }

    let rd = RouteDomain {
        id: next_route_domain_id(client, device),
        name: name.to_string(),
        partition: partition.to_string(),
        vlans: Vec::new(),
        strict: false,
    };
    client.route_domains
        .lock()
        .unwrap()
        .insert((device.hostname.clone(), rd.id), rd.clone());
    client.mutated();
    Ok(rd)
}

pub fn create_route_domain(
    client: &MockDeviceClient,
    device: &Device,
    partition: &str,
    strictness: bool,
    is_aux: bool,
) -> Result<RouteDomain, DeviceError> {
    client.record(device, "create_route_domain", partition)?;

    let id = next_route_domain_id(client, device);
    let name = if is_aux {
        format!("{}_aux_{}", partition, id)
    } else {
        partition.to_string()
    };
    let rd = RouteDomain {
        id,
        name,
        partition: partition.to_string(),
        vlans: Vec::new(),
        strict: strictness,
    };
    client.route_domains
        .lock()
        .unwrap()
        .insert((device.hostname.clone(), id), rd.clone());
    client.mutated();
    Ok(rd)
}

pub fn route_domain_ids(client: &MockDeviceClient, device: &Device, partition: &str) -> Result<Vec<u32>, DeviceError> {
    client.record(device, "route_domain_ids", partition)?;
    Ok(client.route_domains
        .lock()
        .unwrap()
        .iter()
        .filter(|((d, _), rd)| *d == device.hostname && rd.partition == partition)
        .map(|((_, id), _)| *id)
        .collect())
}

pub fn vlans_in_route_domain(client: &MockDeviceClient, device: &Device, partition: &str, route_domain_id: u32) -> Result<Vec<String>, DeviceError> {
    client.record(device, "vlans_in_route_domain", &format!("/{}/{}", partition, route_domain_id))?;
    client.route_domains
        .lock()
        .unwrap()
        .get(&(device.hostname.clone(), route_domain_id))
        .filter(|rd| rd.partition == partition)
        .map(|rd| rd.vlans.clone())
        .ok_or_else(|| DeviceError::NotFound(format!("route domain {} not found in {}", route_domain_id, partition)))
}

pub fn segmentation_id(client: &MockDeviceClient, device: &Device, partition: &str, name: &str, operation: &str) -> Result<u32, DeviceError> {
    client.record(device, operation, &format!("/{}/{}", partition, name))?;
    client.networks
        .lock()
        .unwrap()
        .get(&(device.hostname.clone(), partition.to_string(), name.to_string()))
        .and_then(|n| n.segmentation_id)
        .ok_or_else(|| DeviceError::NotFound(format!("network /{}/{} not found on {}", partition, name, device)))
}

pub fn assure_network(client: &MockDeviceClient, device: &Device, network: &L2Network) -> Result<(), DeviceError> {
    client.record(device, "assure_network", &format!("/{}/{}", network.partition, network.name))?;

    let mut route_domains = client.route_domains.lock().unwrap();
    let rd = route_domains
        .get_mut(&(device.hostname.clone(), network.route_domain_id))
        .ok_or_else(|| DeviceError::NotFound(format!("route domain {} not found on {}", network.route_domain_id, device)))?;

    let mut changed = false;
    if !rd.vlans.contains(&network.name) {
        rd.vlans.push(network.name.clone());
        changed = true;
    }

    let key = (device.hostname.clone(), network.partition.clone(), network.name.clone());
    let mut networks = client.networks.lock().unwrap();
    if networks.get(&key) != Some(network) {
        networks.insert(key, network.clone());
        changed = true;
    }

    if changed {
        client.mutated();
    }
    Ok(())
}

pub fn delete_network(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
    client.record(device, "delete_network", &format!("/{}/{}", partition, name))?;

    let key = (device.hostname.clone(), partition.to_string(), name.to_string());
    if client.networks.lock().unwrap().remove(&key).is_none() {
        return Err(DeviceError::NotFound(format!("network /{}/{} not found on {}", partition, name, device)));
    }
    for ((d, _), rd) in client.route_domains.lock().unwrap().iter_mut() {
        if *d == device.hostname {
            rd.vlans.retain(|v| v != name);
        }
    }
    client.fdb
        .lock()
        .unwrap()
        .retain(|(d, entry)| !(*d == device.hostname && entry.tunnel == name));
    client.mutated();
    Ok(())
}

pub fn add_fdb_entry(client: &MockDeviceClient, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError> {
    client.record(device, "add_fdb_entry", &format!("{}/{}", entry.tunnel, entry.ip_address))?;
    if client.fdb.lock().unwrap().insert((device.hostname.clone(), entry.clone())) {
        client.mutated();
    }
    Ok(())
}

pub fn delete_fdb_entry(client: &MockDeviceClient, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError> {
    client.record(device, "delete_fdb_entry", &format!("{}/{}", entry.tunnel, entry.ip_address))?;
    if client.fdb.lock().unwrap().remove(&(device.hostname.clone(), entry.clone())) {
        client.mutated();
    }
    Ok(())
}

pub fn selfips(client: &MockDeviceClient, device: &Device, partition: &str, vlan: Option<&str>) -> Result<Vec<SelfIp>, DeviceError> {
    client.record(device, "selfips", partition)?;
    Ok(client.selfips
        .lock()
        .unwrap()
        .iter()
        .filter(|((d, p, _), selfip)| {
            *d == device.hostname && p == partition && vlan.is_none_or(|v| selfip.vlan == v)
        })
        .map(|(_, selfip)| selfip.clone())
        .collect())
}

pub fn get_selfip(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<SelfIp, DeviceError> {
    client.record(device, "get_selfip", &format!("/{}/{}", partition, name))?;
    client.selfips
        .lock()
        .unwrap()
        .get(&(device.hostname.clone(), partition.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| DeviceError::NotFound(format!("self-IP /{}/{} not found on {}", partition, name, device)))
}

pub fn create_selfip(client: &MockDeviceClient, device: &Device, selfip: &SelfIp) -> Result<(), DeviceError> {
    client.record(device, "create_selfip", &format!("/{}/{}", selfip.partition, selfip.name))?;

    let key = (device.hostname.clone(), selfip.partition.clone(), selfip.name.clone());
    let mut selfips = client.selfips.lock().unwrap();
    if selfips.contains_key(&key) {
        return Err(DeviceError::Conflict(format!("self-IP /{}/{} already exists on {}", selfip.partition, selfip.name, device)));
    }
    selfips.insert(key, selfip.clone());
    client.mutated();
    Ok(())
}

pub fn delete_selfip(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
    client.record(device, "delete_selfip", &format!("/{}/{}", partition, name))?;

    let key = (device.hostname.clone(), partition.to_string(), name.to_string());
    if client.selfips.lock().unwrap().remove(&key).is_none() {
        return Err(DeviceError::NotFound(format!("self-IP /{}/{} not found on {}", partition, name, device)));
    }
    client.mutated();
    Ok(())
}
