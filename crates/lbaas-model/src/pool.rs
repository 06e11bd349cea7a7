//! Pools, members and health monitors

use crate::status::{OperatingStatus, ProvisioningStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference from a pool to a listener using it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct ListenerRef {
    /// Listener id
    pub id: String,
}

/// Session persistence settings of a pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct SessionPersistence {
    /// Persistence type ("SOURCE_IP", "HTTP_COOKIE", "APP_COOKIE")
    #[serde(rename = "type")]
    pub persistence_type: String,

    /// Cookie name for APP_COOKIE persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,
}

/// A pool of backend members
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Pool {
    /// Pool id
    pub id: String,

    /// Listeners this pool is attached to
    #[serde(default)]
    pub listeners: Vec<ListenerRef>,

    /// Load balancing algorithm ("ROUND_ROBIN", "LEAST_CONNECTIONS", "SOURCE_IP")
    #[serde(default = "default_lb_algorithm")]
    pub lb_algorithm: String,

    /// Session persistence, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_persistence: Option<SessionPersistence>,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,
}

fn default_lb_algorithm() -> String {
    "ROUND_ROBIN".to_string()
}

/// Network port a member is bound to (used for FDB entries)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct MemberPort {
    /// MAC address of the port
    pub mac_address: String,
}

/// A backend member of a pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Member {
    /// Member id
    pub id: String,

    /// Pool the member belongs to
    pub pool_id: String,

    /// Member address; carries a `%<route domain>` suffix once annotated
    pub address: String,

    /// Member port
    #[serde(default)]
    pub protocol_port: u16,

    /// Weight
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Subnet the member address lives on
    pub subnet_id: String,

    /// Network the member address lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Network port, when the member is a tenant instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<MemberPort>,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,

    /// Operating status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_status: Option<OperatingStatus>,
}

fn default_weight() -> u32 {
    1
}

/// A health monitor attached to a pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct HealthMonitor {
    /// Monitor id
    pub id: String,

    /// Pool being monitored
    pub pool_id: String,

    /// Monitor type ("HTTP", "HTTPS", "TCP", "PING")
    #[serde(rename = "type", default)]
    pub monitor_type: String,

    /// Probe interval in seconds
    #[serde(default)]
    pub delay: u32,

    /// Probe timeout in seconds
    #[serde(default)]
    pub timeout: u32,

    /// Consecutive failures before marking a member down
    #[serde(default)]
    pub max_retries: u32,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,
}
