//! Network control-plane collaborators
//!
//! The agent allocates ports for self-IPs, SNAT and gateway addresses,
//! asks which load balancers live on a network, and announces device-owned
//! addresses for L3 reachability.

use crate::error::DeviceError;
use crate::models::{LoadBalancerRecord, Port};

/// Port allocation in the network control plane
#[async_trait::async_trait]
pub trait PortProvisioner: Send + Sync {
    /// Find a port by its name
    async fn get_port_by_name(&self, name: &str) -> Result<Option<Port>, DeviceError>;

    /// Create a port on a subnet, optionally pinning its fixed IP
    async fn create_port_on_subnet(&self, subnet_id: &str, name: &str, fixed_ip: Option<&str>) -> Result<Port, DeviceError>;

    /// Delete every port carrying this name. Absent ports are not an error.
    async fn delete_port_by_name(&self, name: &str) -> Result<(), DeviceError>;
}

/// Read-only view of the load balancers known to the control plane
#[async_trait::async_trait]
pub trait LoadBalancerRegistry: Send + Sync {
    async fn loadbalancers_by_network(&self, network_id: &str) -> Result<Vec<LoadBalancerRecord>, DeviceError>;
}

/// External L3 advertisement of device-owned addresses (VIPs, self-IPs)
#[async_trait::async_trait]
pub trait L3Binding: Send + Sync {
    async fn bind_address(&self, subnet_id: &str, ip_address: &str) -> Result<(), DeviceError>;
    async fn unbind_address(&self, subnet_id: &str, ip_address: &str) -> Result<(), DeviceError>;
}
