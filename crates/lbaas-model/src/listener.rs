//! Listener (virtual server)

use crate::status::{OperatingStatus, ProvisioningStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A listener accepting client traffic on the VIP
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Listener {
    /// Listener id
    pub id: String,

    /// Protocol ("HTTP", "TCP", "TERMINATED_HTTPS", ...)
    #[serde(default)]
    pub protocol: String,

    /// Port on the VIP
    #[serde(default)]
    pub protocol_port: u16,

    /// Pool receiving traffic when no L7 policy matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pool_id: Option<String>,

    /// Connection limit (-1 for unlimited)
    #[serde(default = "default_connection_limit")]
    pub connection_limit: i64,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,

    /// Operating status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_status: Option<OperatingStatus>,
}

fn default_connection_limit() -> i64 {
    -1
}
