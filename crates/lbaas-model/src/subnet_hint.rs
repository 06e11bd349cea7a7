//! Per-device subnet hints
//!
//! For every device the caller keeps two collections across reconciliation
//! calls: subnets known to be in use (`do_not_delete_subnets`) and subnets
//! that might be torn down after this pass (`check_for_delete_subnets`).
//! A subnet is never in both; `do_not_delete_subnets` wins.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Teardown candidate recorded for a subnet
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SubnetDeleteCandidate {
    /// Network owning the subnet
    pub network_id: String,
    /// Subnet id
    pub subnet_id: String,
    /// Whether the subnet was recorded for a member rather than the VIP
    pub is_for_member: bool,
}

/// Subnet bookkeeping for one device
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct SubnetHint {
    /// Subnets that must be kept
    #[serde(default)]
    pub do_not_delete_subnets: BTreeSet<String>,

    /// Subnets to examine for teardown, keyed by subnet id
    #[serde(default)]
    pub check_for_delete_subnets: BTreeMap<String, SubnetDeleteCandidate>,
}

/// Subnet hints keyed by device name
pub type SubnetHints = BTreeMap<String, SubnetHint>;
