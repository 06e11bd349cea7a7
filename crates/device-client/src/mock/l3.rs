//! L3 operations for MockDeviceClient
//!
//! Handles SNAT pools, gateway self-IPs, static routes and ARP entries

use super::MockDeviceClient;
use crate::error::DeviceError;
use crate::models::*;
use std::net::IpAddr;

pub fn assure_snat_translations(client: &MockDeviceClient, device: &Device, request: &SnatRequest) -> Result<(), DeviceError> {
    client.record(device, "assure_snat_translations", &format!("/{}/{}", request.partition, request.subnet_id))?;

    let key = (device.hostname.clone(), request.partition.clone(), request.subnet_id.clone());
    let mut pools = client.snat_pools.lock().unwrap();
    let owners = pools.entry(key).or_default();
    if owners.get(&request.owner) != Some(&request.translations) {
        owners.insert(request.owner.clone(), request.translations.clone());
        client.mutated();
    }
    Ok(())
}

pub fn release_snat_translations(
    client: &MockDeviceClient,
    device: &Device,
    partition: &str,
    subnet_id: &str,
    owner: &str,
) -> Result<SnatRelease, DeviceError> {
    client.record(device, "release_snat_translations", &format!("/{}/{}", partition, subnet_id))?;

    let key = (device.hostname.clone(), partition.to_string(), subnet_id.to_string());
    let mut pools = client.snat_pools.lock().unwrap();
    let Some(owners) = pools.get_mut(&key) else {
        return Ok(SnatRelease::default());
    };

    let released = owners.remove(owner);
    if !owners.is_empty() {
        if released.is_some() {
            client.mutated();
        }
        return Ok(SnatRelease {
            deleted_names: Vec::new(),
            in_use_subnets: vec![subnet_id.to_string()],
        });
    }

    pools.remove(&key);
    client.mutated();
    Ok(SnatRelease {
        deleted_names: released
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.name)
            .collect(),
        in_use_subnets: Vec::new(),
    })
}

pub fn assure_gateway(client: &MockDeviceClient, device: &Device, gateway: &SelfIp) -> Result<(), DeviceError> {
    client.record(device, "assure_gateway", &format!("/{}/{}", gateway.partition, gateway.name))?;

    let key = (device.hostname.clone(), gateway.partition.clone(), gateway.name.clone());
    let mut gateways = client.gateways.lock().unwrap();
    if gateways.get(&key) != Some(gateway) {
        gateways.insert(key, gateway.clone());
        client.mutated();
    }
    Ok(())
}

pub fn delete_gateway(client: &MockDeviceClient, device: &Device, partition: &str, subnet_id: &str) -> Result<String, DeviceError> {
    let name = gateway_name(subnet_id);
    client.record(device, "delete_gateway", &format!("/{}/{}", partition, name))?;

    let key = (device.hostname.clone(), partition.to_string(), name.clone());
    if client.gateways.lock().unwrap().remove(&key).is_some() {
        client.mutated();
    }
    Ok(name)
}

pub fn route_exists(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<bool, DeviceError> {
    client.record(device, "route_exists", &format!("/{}/{}", partition, name))?;
    Ok(client.routes
        .lock()
        .unwrap()
        .contains_key(&(device.hostname.clone(), partition.to_string(), name.to_string())))
}

pub fn create_route(client: &MockDeviceClient, device: &Device, route: &Route) -> Result<(), DeviceError> {
    client.record(device, "create_route", &format!("/{}/{}", route.partition, route.name))?;

    let key = (device.hostname.clone(), route.partition.clone(), route.name.clone());
    let mut routes = client.routes.lock().unwrap();
    if routes.contains_key(&key) {
        return Err(DeviceError::Conflict(format!("route /{}/{} already exists on {}", route.partition, route.name, device)));
    }
    routes.insert(key, route.clone());
    client.mutated();
    Ok(())
}

pub fn delete_route(client: &MockDeviceClient, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
    client.record(device, "delete_route", &format!("/{}/{}", partition, name))?;

    let key = (device.hostname.clone(), partition.to_string(), name.to_string());
    if client.routes.lock().unwrap().remove(&key).is_none() {
        return Err(DeviceError::NotFound(format!("route /{}/{} not found on {}", partition, name, device)));
    }
    client.mutated();
    Ok(())
}

pub fn delete_arp_entries(client: &MockDeviceClient, device: &Device, partition: &str, cidr: &str) -> Result<Vec<String>, DeviceError> {
    client.record(device, "delete_arp_entries", &format!("/{}/{}", partition, cidr))?;

    let network = network_of(cidr).ok_or_else(|| DeviceError::InvalidRequest(format!("invalid CIDR {}", cidr)))?;
    let mut arp = client.arp_entries.lock().unwrap();
    let Some(entries) = arp.get_mut(&(device.hostname.clone(), partition.to_string())) else {
        return Ok(Vec::new());
    };

    let removed: Vec<String> = entries
        .iter()
        .filter(|ip| ip.parse::<IpAddr>().is_ok_and(|addr| network.contains(&addr)))
        .cloned()
        .collect();
    for ip in &removed {
        entries.remove(ip);
    }
    if !removed.is_empty() {
        client.mutated();
    }
    Ok(removed)
}
