//! L7 policies and rules

use crate::status::ProvisioningStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An L7 content-switching policy on a listener
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct L7Policy {
    /// Policy id
    pub id: String,

    /// Policy name; names of enhanced service definitions are handled elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Listener the policy is attached to
    pub listener_id: String,

    /// Action ("REJECT", "REDIRECT_TO_POOL", "REDIRECT_TO_URL")
    #[serde(default)]
    pub action: String,

    /// Target pool for REDIRECT_TO_POOL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_pool_id: Option<String>,

    /// Target URL for REDIRECT_TO_URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Evaluation order on the listener
    #[serde(default)]
    pub position: u32,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,
}

/// A rule inside an L7 policy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct L7Rule {
    /// Rule id
    pub id: String,

    /// Owning policy
    pub policy_id: String,

    /// Rule type ("HOST_NAME", "PATH", "HEADER", ...)
    #[serde(rename = "type", default)]
    pub rule_type: String,

    /// Comparison ("EQUAL_TO", "STARTS_WITH", ...)
    #[serde(default)]
    pub compare_type: String,

    /// Header or cookie key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Value to compare against
    #[serde(default)]
    pub value: String,

    /// Negate the comparison
    #[serde(default)]
    pub invert: bool,

    /// Provisioning status
    pub provisioning_status: ProvisioningStatus,
}
