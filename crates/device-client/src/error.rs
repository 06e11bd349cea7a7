//! Device client errors

use thiserror::Error;

/// Errors that can occur when talking to a device or the control plane.
///
/// `Conflict` and `NotFound` are expected outcomes when re-applying state
/// that already converged; callers branch on them with a plain `match`.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Object already exists (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Device API returned any other error
    #[error("Device API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid credentials, expired token, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DeviceError {
    /// True for [`DeviceError::Conflict`]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True for [`DeviceError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
