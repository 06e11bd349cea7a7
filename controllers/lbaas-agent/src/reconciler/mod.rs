//! Service reconciliation
//!
//! A reconciliation pass takes one service definition and converges the
//! device fleet onto it:
//! - network attachment of every subnet the service touches
//! - the resource passes, either the apply pipeline or the delete pipeline
//! - teardown of subnets nothing uses anymore, driven by the subnet hints
//!
//! The pipelines are split by direction:
//! - `apply`: load balancer, pools, listeners, monitors, members, pool
//!   attachment, L7 policies, L7 rules
//! - `delete`: the reverse dependency order
//! - `status`: listener statistics and member operating status

mod apply;
#[cfg(test)]
mod apply_test;
mod delete;
mod status;

pub use status::convert_operating_status;

use crate::builders::{Builders, ResourceBuilder};
use crate::config::AgentConfig;
use crate::error::ReconcileError;
use crate::network::{ControlPlane, NetworkAttachmentManager};
use crate::route_domain::RouteDomainAllocator;
use device_client::{Device, DeviceClientTrait, DeviceError, L3Binding};
use lbaas_model::{LoadBalancer, ModelError, ProvisioningStatus, ServiceDefinition, ServiceIndex, SubnetHints};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Which builder operation to try first for a resource that should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preference {
    Create,
    Update,
}

impl From<ProvisioningStatus> for Preference {
    fn from(status: ProvisioningStatus) -> Self {
        match status {
            ProvisioningStatus::PendingUpdate => Self::Update,
            _ => Self::Create,
        }
    }
}

/// Create or update a resource, whichever it needs.
///
/// A create that finds the object already there falls back to update; an
/// update that finds nothing falls back to create.
async fn upsert<C, B>(
    builder: &B,
    ctx: &C,
    devices: &[Device],
    status: ProvisioningStatus,
    kind: &str,
    id: &str,
) -> Result<(), DeviceError>
where
    C: Send + Sync,
    B: ResourceBuilder<C> + ?Sized,
{
    match Preference::from(status) {
        Preference::Create => match builder.create(ctx, devices).await {
            Err(DeviceError::Conflict(message)) => {
                debug!("{} {} already exists ({}), updating", kind, id, message);
                builder.update(ctx, devices).await
            }
            other => other,
        },
        Preference::Update => match builder.update(ctx, devices).await {
            Err(DeviceError::NotFound(message)) => {
                warn!("{} {} is missing ({}), creating", kind, id, message);
                match builder.create(ctx, devices).await {
                    Err(DeviceError::Conflict(_)) => Ok(()),
                    other => other,
                }
            }
            other => other,
        },
    }
}

/// Mark a failed resource and its load balancer as ERROR
fn resource_error(
    loadbalancer: &mut LoadBalancer,
    status: &mut ProvisioningStatus,
    kind: &'static str,
    id: &str,
    source: DeviceError,
) -> ReconcileError {
    error!("Failed to reconcile {} {}: {}", kind, id, source);
    *status = ProvisioningStatus::Error;
    loadbalancer.provisioning_status = ProvisioningStatus::Error;
    ReconcileError::Resource {
        kind,
        id: id.to_string(),
        source,
    }
}

fn missing(kind: &'static str, id: &str) -> ReconcileError {
    ReconcileError::Model(ModelError::MissingReference {
        kind,
        id: id.to_string(),
    })
}

/// Reconciles load balancer services onto the device fleet
pub struct ServiceReconciler {
    config: Arc<AgentConfig>,
    device_client: Arc<dyn DeviceClientTrait>,
    builders: Builders,
    l3_binding: Option<Arc<dyn L3Binding>>,
    network: NetworkAttachmentManager,
}

impl ServiceReconciler {
    /// Reconciler using the device-backed builders
    pub fn new(
        config: Arc<AgentConfig>,
        device_client: Arc<dyn DeviceClientTrait>,
        control_plane: ControlPlane,
    ) -> Self {
        let builders = Builders::device(config.clone(), device_client.clone());
        Self::with_builders(config, device_client, control_plane, builders)
    }

    pub fn with_builders(
        config: Arc<AgentConfig>,
        device_client: Arc<dyn DeviceClientTrait>,
        control_plane: ControlPlane,
        builders: Builders,
    ) -> Self {
        let l3_binding = control_plane.l3_binding.clone();
        let route_domains = Arc::new(RouteDomainAllocator::new(device_client.clone(), config.clone()));
        let network = NetworkAttachmentManager::new(config.clone(), device_client.clone(), control_plane, route_domains);
        Self {
            config,
            device_client,
            builders,
            l3_binding,
            network,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Statuses are written back into `service` and the subnet hints are
    /// updated in place. Subnet teardown only runs after the resource
    /// passes succeeded.
    pub async fn reconcile(
        &self,
        service: &mut ServiceDefinition,
        hints: &mut SubnetHints,
        delete_mode: bool,
    ) -> Result<(), ReconcileError> {
        info!(
            "Reconciling load balancer {} (tenant {}, delete mode: {})",
            service.loadbalancer.id, service.loadbalancer.tenant_id, delete_mode
        );

        self.network.prep_service_networking(service).await?;
        self.assure_service(service, hints, delete_mode).await?;
        self.network.post_service_networking(service, hints).await;
        Ok(())
    }

    /// Run the resource passes of one pipeline.
    ///
    /// The load balancer itself is always assured first. The first failing
    /// pass aborts the pipeline; resources it already handled keep their
    /// status.
    pub async fn assure_service(
        &self,
        service: &mut ServiceDefinition,
        hints: &mut SubnetHints,
        delete_mode: bool,
    ) -> Result<(), ReconcileError> {
        let started = Instant::now();
        let index = ServiceIndex::build(service);

        self.assure_loadbalancer_created(service, hints).await?;

        if delete_mode {
            debug!("Running delete pipeline for load balancer {}", service.loadbalancer.id);
            self.assure_monitors_deleted(service, &index).await?;
            self.assure_members_deleted(service, &index, hints).await?;
            self.assure_l7rules_deleted(service, &index).await?;
            self.assure_l7policies_deleted(service, &index).await?;
            self.assure_pools_deleted(service, &index).await?;
            self.assure_listeners_deleted(service).await?;
            self.assure_loadbalancer_deleted(service).await?;
        } else {
            debug!("Running apply pipeline for load balancer {}", service.loadbalancer.id);
            self.assure_pools_created(service).await?;
            self.assure_listeners_created(service, &index).await?;
            self.assure_monitors_created(service, &index).await?;
            self.assure_members_created(service, &index, hints).await?;
            self.assure_pools_configured(service, &index).await?;
            self.assure_l7policies_created(service, &index).await?;
            self.assure_l7rules_created(service, &index).await?;
        }

        debug!("assure_service took {:.5} secs", started.elapsed().as_secs_f64());
        Ok(())
    }
}
