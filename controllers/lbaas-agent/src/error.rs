//! Agent-specific error types.
//!
//! This module defines the errors a reconciliation pass can raise. Device
//! and model errors are wrapped; everything else is specific to the engine.

use device_client::DeviceError;
use lbaas_model::ModelError;
use thiserror::Error;

/// Errors that can occur while reconciling a service definition.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Network segmentation definition is incomplete; raised before any device mutation
    #[error("Invalid network definition: {0}")]
    Validation(String),

    /// Network segments are not bound yet (hierarchical port binding)
    #[error("Network not ready: {0}")]
    NetworkNotReady(String),

    /// Tenant has used up its route domains
    #[error("Cannot allocate route domain for tenant {tenant_id}")]
    AllocationExhausted { tenant_id: String },

    /// Address could not be placed into a route domain
    #[error("Route domain error: {0}")]
    RouteDomain(String),

    /// SNAT translations could not be provided
    #[error("SNAT error: {0}")]
    Snat(String),

    /// Gateway address could not be claimed
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A resource failed on the devices; its status and the load balancer's are ERROR
    #[error("{kind} {id} failed: {source}")]
    Resource {
        kind: &'static str,
        id: String,
        #[source]
        source: DeviceError,
    },

    /// Device API error outside a resource pass
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Service definition error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
