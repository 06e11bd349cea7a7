//! Listener statistics and member operating status

use super::ServiceReconciler;
use crate::builders::{ListenerContext, MemberContext};
use crate::error::ReconcileError;
use device_client::{MemberState, ObjectStats};
use lbaas_model::{OperatingStatus, ProvisioningStatus, ServiceDefinition, ServiceIndex};
use tracing::{debug, warn};

/// Map device-reported member health onto an operating status.
///
/// | availability | enabled    | status       |
/// |--------------|------------|--------------|
/// | available    | enabled    | `Online`     |
/// | available    | disabled   | `Disabled`   |
/// | offline      | any        | `Offline`    |
/// | unknown      | any        | `NoMonitor`  |
///
/// Anything else is unresolved.
pub fn convert_operating_status(state: &MemberState) -> Option<OperatingStatus> {
    match (state.availability.as_str(), state.enabled.as_str()) {
        ("available", "enabled") => Some(OperatingStatus::Online),
        ("available", "disabled") => Some(OperatingStatus::Disabled),
        ("offline", _) => Some(OperatingStatus::Offline),
        ("unknown", _) => Some(OperatingStatus::NoMonitor),
        (availability, enabled) => {
            warn!("Unsupported member status {} / {}", availability, enabled);
            None
        }
    }
}

impl ServiceReconciler {
    /// Add the counters of every listener to `stats`.
    ///
    /// The keys already present in `stats` are the counters queried. Listeners
    /// are included whatever their provisioning status.
    pub async fn get_listener_stats(
        &self,
        service: &ServiceDefinition,
        stats: &mut ObjectStats,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();
        let keys: Vec<String> = stats.keys().cloned().collect();

        for listener in &service.listeners {
            let ctx = ListenerContext {
                loadbalancer: service.loadbalancer.clone(),
                listener: listener.clone(),
                pool: None,
            };
            let listener_stats = self.builders.listeners.get_stats(&ctx, &keys, &devices).await?;
            for key in &keys {
                if let (Some(total), Some(value)) = (stats.get_mut(key), listener_stats.get(key)) {
                    *total += value;
                }
            }
        }
        Ok(())
    }

    /// Refresh the operating status of every ACTIVE member from the active device
    pub async fn update_operating_status(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        let Some(device) = self.device_client.active_device() else {
            warn!("No active device, member operating status not refreshed");
            return Ok(());
        };
        let index = ServiceIndex::build(service);

        for i in 0..service.members.len() {
            let member = &service.members[i];
            if member.provisioning_status != ProvisioningStatus::Active {
                continue;
            }
            let Some(pool) = index.pool(service, &member.pool_id) else {
                warn!("Pool {} of member {} is not part of the service", member.pool_id, member.id);
                continue;
            };

            let ctx = MemberContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                member: member.clone(),
            };
            let state = self.builders.members.member_status(&ctx, &device).await?;
            let operating_status = convert_operating_status(&state);
            debug!("Member {} on {} is {:?}", ctx.member.id, device, operating_status);
            service.members[i].operating_status = operating_status;
        }
        Ok(())
    }
}
