//! Device and control-plane data models
//!
//! Types exchanged with the load balancer devices and the network control
//! plane. LTM objects carry their attributes as a JSON body so the
//! builders decide the exact payload per object kind.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A load balancer device in the fleet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Device {
    /// Hostname, used as the device key in subnet hints
    pub hostname: String,
}

impl Device {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self { hostname: hostname.into() }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hostname)
    }
}

/// Kind of an LTM configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    VirtualAddress,
    Listener,
    Pool,
    Member,
    Monitor,
    L7Policy,
    L7Rule,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualAddress => "virtual_address",
            Self::Listener => "listener",
            Self::Pool => "pool",
            Self::Member => "member",
            Self::Monitor => "monitor",
            Self::L7Policy => "l7policy",
            Self::L7Rule => "l7rule",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An LTM object (virtual address, virtual server, pool, member, ...)
///
/// Objects are addressed by `(kind, partition, name)`. The body is a JSON
/// object; on update its keys are merged into the stored object and keys
/// set to `null` are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtmObject {
    pub kind: ObjectKind,
    pub partition: String,
    pub name: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl LtmObject {
    pub fn new(kind: ObjectKind, partition: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            partition: partition.into(),
            name: name.into(),
            body: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// `kind:/partition/name`, used in log lines and error messages
    pub fn full_path(&self) -> String {
        format!("{}:/{}/{}", self.kind, self.partition, self.name)
    }
}

/// Live health of a pool member as reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    /// e.g. "available", "offline", "unknown"
    pub availability: String,
    /// e.g. "enabled", "disabled"
    pub enabled: String,
}

impl Default for MemberState {
    fn default() -> Self {
        Self {
            availability: "unknown".to_string(),
            enabled: "enabled".to_string(),
        }
    }
}

/// Object statistics keyed by counter name
pub type ObjectStats = BTreeMap<String, u64>;

/// A route domain (namespace) configured on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDomain {
    pub id: u32,
    pub name: String,
    pub partition: String,
    /// Names of the VLANs and tunnels attached to this route domain
    #[serde(default)]
    pub vlans: Vec<String>,
    #[serde(default)]
    pub strict: bool,
}

/// L2 segment as realized on a device (VLAN or tunnel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Network {
    /// Device object name, e.g. `vlan-1001` or `tunnel-vxlan-77`
    pub name: String,
    pub partition: String,
    pub network_type: String,
    pub segmentation_id: Option<u32>,
    /// Route domain the segment is attached to
    pub route_domain_id: u32,
}

/// Forwarding database entry on an overlay tunnel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FdbEntry {
    /// Tunnel name the entry belongs to
    pub tunnel: String,
    pub partition: String,
    pub mac_address: String,
    pub ip_address: String,
}

/// Self-IP: an interface address a device owns on a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIp {
    pub name: String,
    pub partition: String,
    /// Address with route-domain suffix and prefix length, e.g. `10.0.0.5%2/24`
    pub address: String,
    pub vlan: String,
    pub traffic_group: String,
}

/// A single SNAT translation address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnatTranslation {
    pub name: String,
    /// Address with route-domain suffix, e.g. `10.0.0.9%2`
    pub address: String,
}

/// Request to make sure a SNAT pool exists for a subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnatRequest {
    pub partition: String,
    pub subnet_id: String,
    /// Tenant (or load balancer) that uses the translations
    pub owner: String,
    pub translations: Vec<SnatTranslation>,
    pub traffic_group: String,
}

/// Outcome of releasing a SNAT pool for one owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnatRelease {
    /// Translations that were removed from the device
    pub deleted_names: Vec<String>,
    /// Subnets whose translations are still used by another owner
    pub in_use_subnets: Vec<String>,
}

/// Route-domain scoped static route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub partition: String,
    /// Destination, e.g. `default%2` or `0.0.0.0%2/0`
    pub destination: String,
    /// Next hop with route-domain suffix
    pub gateway: String,
}

/// Port allocated by the network control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    pub network_id: String,
    pub ip_address: String,
    pub mac_address: String,
}

/// Control-plane view of a load balancer, used to decide whether a network
/// still hosts load balancers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerRecord {
    pub id: String,
    pub network_id: String,
    pub provisioning_status: String,
}

/// Parse `a.b.c.d/len` into its network, ignoring host bits
pub fn network_of(cidr: &str) -> Option<IpNet> {
    cidr.parse::<IpNet>().ok().map(|net| net.trunc())
}

/// Device name of a subnet's gateway self-IP
pub fn gateway_name(subnet_id: &str) -> String {
    format!("gw-{}", subnet_id)
}
