//! DeviceClient trait for mocking
//!
//! This trait abstracts the device fleet and its control API so the
//! reconciliation engine can run against real devices or an in-memory mock.

use crate::error::DeviceError;
use crate::models::*;

/// Trait for load balancer device operations
///
/// Every per-device operation takes the target [`Device`] explicitly; the
/// caller decides whether to fan out over all configured devices or talk
/// to the active one only.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait DeviceClientTrait: Send + Sync {
    // Fleet
    /// Every device the agent knows about
    fn all_devices(&self) -> Vec<Device>;
    /// Devices that receive configuration changes
    fn configured_devices(&self) -> Vec<Device>;
    /// Device that answers read-only queries (stats, member health)
    fn active_device(&self) -> Option<Device>;

    // LTM objects
    async fn get_object(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<LtmObject, DeviceError>;
    /// Create an object; [`DeviceError::Conflict`] if it already exists
    async fn create_object(&self, device: &Device, object: &LtmObject) -> Result<(), DeviceError>;
    /// Merge the body into an existing object; [`DeviceError::NotFound`] if absent
    async fn update_object(&self, device: &Device, object: &LtmObject) -> Result<(), DeviceError>;
    /// Delete an object; [`DeviceError::NotFound`] if absent
    async fn delete_object(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<(), DeviceError>;
    async fn object_stats(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str, keys: &[String]) -> Result<ObjectStats, DeviceError>;
    async fn member_state(&self, device: &Device, partition: &str, name: &str) -> Result<MemberState, DeviceError>;

    // Address inventory
    /// Addresses of all virtual addresses in a partition
    async fn virtual_addresses(&self, device: &Device, partition: &str) -> Result<Vec<String>, DeviceError>;
    /// Addresses of all pool nodes in a partition
    async fn node_addresses(&self, device: &Device, partition: &str) -> Result<Vec<String>, DeviceError>;

    // Route domains
    /// Look up a route domain by name, creating it if it does not exist
    async fn get_route_domain(&self, device: &Device, partition: &str, name: &str) -> Result<RouteDomain, DeviceError>;
    /// Create a new route domain with the next free id
    async fn create_route_domain(&self, device: &Device, partition: &str, strictness: bool, is_aux: bool) -> Result<RouteDomain, DeviceError>;
    async fn route_domain_ids(&self, device: &Device, partition: &str) -> Result<Vec<u32>, DeviceError>;
    async fn vlans_in_route_domain(&self, device: &Device, partition: &str, route_domain_id: u32) -> Result<Vec<String>, DeviceError>;

    // L2 segments
    /// Segmentation key of a tunnel by its device name
    async fn tunnel_key(&self, device: &Device, partition: &str, name: &str) -> Result<u32, DeviceError>;
    /// VLAN tag of a VLAN by its device name
    async fn vlan_id(&self, device: &Device, partition: &str, name: &str) -> Result<u32, DeviceError>;
    async fn assure_network(&self, device: &Device, network: &L2Network) -> Result<(), DeviceError>;
    async fn delete_network(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError>;

    // Forwarding database
    async fn add_fdb_entry(&self, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError>;
    async fn delete_fdb_entry(&self, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError>;

    // Self-IPs
    async fn selfips(&self, device: &Device, partition: &str, vlan: Option<&str>) -> Result<Vec<SelfIp>, DeviceError>;
    async fn get_selfip(&self, device: &Device, partition: &str, name: &str) -> Result<SelfIp, DeviceError>;
    /// Create a self-IP; [`DeviceError::Conflict`] if one with this name exists
    async fn create_selfip(&self, device: &Device, selfip: &SelfIp) -> Result<(), DeviceError>;
    async fn delete_selfip(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError>;

    // SNAT
    async fn assure_snat_translations(&self, device: &Device, request: &SnatRequest) -> Result<(), DeviceError>;
    /// Drop `owner` from a subnet's SNAT pool and delete translations nobody uses
    async fn release_snat_translations(&self, device: &Device, partition: &str, subnet_id: &str, owner: &str) -> Result<SnatRelease, DeviceError>;

    // Gateways
    async fn assure_gateway(&self, device: &Device, gateway: &SelfIp) -> Result<(), DeviceError>;
    /// Delete a subnet's gateway self-IP, returning the name that was used
    async fn delete_gateway(&self, device: &Device, partition: &str, subnet_id: &str) -> Result<String, DeviceError>;

    // Routes and ARP
    async fn route_exists(&self, device: &Device, partition: &str, name: &str) -> Result<bool, DeviceError>;
    async fn create_route(&self, device: &Device, route: &Route) -> Result<(), DeviceError>;
    async fn delete_route(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError>;
    /// Delete static ARP entries inside `cidr`; returns the removed addresses
    async fn delete_arp_entries(&self, device: &Device, partition: &str, cidr: &str) -> Result<Vec<String>, DeviceError>;
}
