//! Model errors

use thiserror::Error;

/// Errors raised while interpreting a service definition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Network type or segmentation id missing, so no short name can be derived
    #[error("Provider network attributes not complete: network_type - {network_type:?} and segmentation_id - {segmentation_id:?}")]
    InvalidNetworkType {
        /// `provider:network_type` as supplied
        network_type: Option<String>,
        /// `provider:segmentation_id` as supplied
        segmentation_id: Option<u32>,
    },

    /// Subnet CIDR could not be parsed
    #[error("Invalid CIDR '{0}'")]
    InvalidCidr(String),

    /// A resource references an id that is not present in the definition
    #[error("{kind} {id} not found in service definition")]
    MissingReference {
        /// Kind of the missing resource ("pool", "network", ...)
        kind: &'static str,
        /// Referenced id
        id: String,
    },
}
