//! Load balancer (the virtual IP owner)

use crate::status::{OperatingStatus, ProvisioningStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The load balancer at the root of a service definition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct LoadBalancer {
    /// Load balancer id
    pub id: String,

    /// Owning tenant (project) id
    pub tenant_id: String,

    /// Virtual IP address; carries a `%<route domain>` suffix once annotated
    pub vip_address: String,

    /// Subnet the VIP lives on
    pub vip_subnet_id: String,

    /// Network the VIP lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,

    /// Operating status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_status: Option<OperatingStatus>,
}
