//! Mock network control plane
//!
//! Allocates port addresses from registered subnets, serves a static list of
//! load balancers and records L3 bindings.

use crate::control_plane::{L3Binding, LoadBalancerRegistry, PortProvisioner};
use crate::error::DeviceError;
use crate::models::*;
use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Mock control plane for testing
#[derive(Clone, Default)]
pub struct MockControlPlane {
    /// subnet id -> (network id, cidr)
    subnets: Arc<Mutex<HashMap<String, (String, IpNet)>>>,
    ports: Arc<Mutex<BTreeMap<u64, Port>>>,
    loadbalancers: Arc<Mutex<Vec<LoadBalancerRecord>>>,
    bindings: Arc<Mutex<BTreeSet<(String, String)>>>,
    failing_subnets: Arc<Mutex<BTreeSet<String>>>,
    next_id: Arc<Mutex<u64>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subnet ports can be allocated from
    pub fn add_subnet(&self, subnet_id: &str, network_id: &str, cidr: &str) {
        if let Some(net) = network_of(cidr) {
            self.subnets
                .lock()
                .unwrap()
                .insert(subnet_id.to_string(), (network_id.to_string(), net));
        }
    }

    pub fn add_loadbalancer(&self, id: &str, network_id: &str, provisioning_status: &str) {
        self.loadbalancers.lock().unwrap().push(LoadBalancerRecord {
            id: id.to_string(),
            network_id: network_id.to_string(),
            provisioning_status: provisioning_status.to_string(),
        });
    }

    /// Make port creation on a subnet fail with an API error
    pub fn fail_port_creation(&self, subnet_id: &str) {
        self.failing_subnets.lock().unwrap().insert(subnet_id.to_string());
    }

    pub fn ports(&self) -> Vec<Port> {
        self.ports.lock().unwrap().values().cloned().collect()
    }

    pub fn port_names(&self) -> Vec<String> {
        self.ports.lock().unwrap().values().map(|p| p.name.clone()).collect()
    }

    /// Current `(subnet_id, ip_address)` bindings
    pub fn bindings(&self) -> Vec<(String, String)> {
        self.bindings.lock().unwrap().iter().cloned().collect()
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    /// First free host address of a subnet, skipping the first host
    /// (conventionally the router)
    fn allocate_address(&self, net: &IpNet) -> Option<String> {
        let used: BTreeSet<String> = self
            .ports
            .lock()
            .unwrap()
            .values()
            .map(|p| p.ip_address.clone())
            .collect();
        net.hosts()
            .skip(1)
            .map(|ip: IpAddr| ip.to_string())
            .find(|ip| !used.contains(ip))
    }
}

#[async_trait::async_trait]
impl PortProvisioner for MockControlPlane {
    async fn get_port_by_name(&self, name: &str) -> Result<Option<Port>, DeviceError> {
        Ok(self.ports.lock().unwrap().values().find(|p| p.name == name).cloned())
    }

    async fn create_port_on_subnet(&self, subnet_id: &str, name: &str, fixed_ip: Option<&str>) -> Result<Port, DeviceError> {
        if self.failing_subnets.lock().unwrap().contains(subnet_id) {
            return Err(DeviceError::Api(format!("port creation on subnet {} failed", subnet_id)));
        }
        let (network_id, net) = self
            .subnets
            .lock()
            .unwrap()
            .get(subnet_id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(format!("subnet {} not found", subnet_id)))?;

        let ip_address = match fixed_ip {
            Some(ip) => ip.to_string(),
            None => self
                .allocate_address(&net)
                .ok_or_else(|| DeviceError::Api(format!("no free addresses on subnet {}", subnet_id)))?,
        };

        let id = self.next_id();
        let port = Port {
            id: format!("port-{}", id),
            name: name.to_string(),
            subnet_id: subnet_id.to_string(),
            network_id,
            ip_address,
            mac_address: format!("fa:16:3e:00:{:02x}:{:02x}", (id >> 8) & 0xff, id & 0xff),
        };
        self.ports.lock().unwrap().insert(id, port.clone());
        Ok(port)
    }

    async fn delete_port_by_name(&self, name: &str) -> Result<(), DeviceError> {
        self.ports.lock().unwrap().retain(|_, p| p.name != name);
        Ok(())
    }
}

#[async_trait::async_trait]
impl LoadBalancerRegistry for MockControlPlane {
    async fn loadbalancers_by_network(&self, network_id: &str) -> Result<Vec<LoadBalancerRecord>, DeviceError> {
        Ok(self
            .loadbalancers
            .lock()
            .unwrap()
            .iter()
            .filter(|lb| lb.network_id == network_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl L3Binding for MockControlPlane {
    async fn bind_address(&self, subnet_id: &str, ip_address: &str) -> Result<(), DeviceError> {
        self.bindings
            .lock()
            .unwrap()
            .insert((subnet_id.to_string(), ip_address.to_string()));
        Ok(())
    }

    async fn unbind_address(&self, subnet_id: &str, ip_address: &str) -> Result<(), DeviceError> {
        self.bindings
            .lock()
            .unwrap()
            .remove(&(subnet_id.to_string(), ip_address.to_string()));
        Ok(())
    }
}
