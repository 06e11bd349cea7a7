//! Provisioning and operating status enums

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning status of a resource in the service definition.
///
/// Only the reconciler transitions it. `Error` is sticky: the engine never
/// clears it, a later reconciliation has to present a fresh desired status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    /// Resource must be created
    #[default]
    PendingCreate,
    /// Resource must be updated
    PendingUpdate,
    /// Resource must be removed
    PendingDelete,
    /// Resource converged
    Active,
    /// Last reconciliation of this resource failed
    Error,
}

impl ProvisioningStatus {
    /// True for `PendingDelete`
    pub fn is_pending_delete(self) -> bool {
        self == Self::PendingDelete
    }

    /// True for the statuses that ask for the resource to exist on the devices
    pub fn is_pending_upsert(self) -> bool {
        matches!(self, Self::PendingCreate | Self::PendingUpdate)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingCreate => "PENDING_CREATE",
            Self::PendingUpdate => "PENDING_UPDATE",
            Self::PendingDelete => "PENDING_DELETE",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Operating status as reported back to the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingStatus {
    /// Available and enabled
    Online,
    /// Available but administratively disabled
    Disabled,
    /// Marked down by its monitor
    Offline,
    /// No monitor attached, availability unknown
    NoMonitor,
}
