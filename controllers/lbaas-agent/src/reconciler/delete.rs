//! Delete pipeline
//!
//! Resources marked PENDING_DELETE are removed in reverse dependency order.
//! Deleting an object that is already gone counts as success.

use super::{ServiceReconciler, missing, resource_error};
use crate::builders::{
    L7PolicyContext, L7RuleContext, ListenerContext, LoadBalancerContext, MemberContext, MonitorContext, PoolContext,
    ResourceBuilder,
};
use crate::error::ReconcileError;
use crate::subnet_hints::SubnetHintTracker;
use device_client::{Device, DeviceError};
use lbaas_model::{ProvisioningStatus, ServiceDefinition, ServiceIndex, SubnetHints, strip_route_domain};
use tracing::{debug, error, warn};

fn tolerate_not_found(result: Result<(), DeviceError>) -> Result<(), DeviceError> {
    match result {
        Err(DeviceError::NotFound(message)) => {
            debug!("Nothing to change: {}", message);
            Ok(())
        }
        other => other,
    }
}

impl ServiceReconciler {
    pub(crate) async fn assure_monitors_deleted(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.healthmonitors.len() {
            let monitor = &service.healthmonitors[i];
            if !monitor.provisioning_status.is_pending_delete() {
                continue;
            }

            let pool = index
                .pool(service, &monitor.pool_id)
                .ok_or_else(|| missing("pool", &monitor.pool_id))?;
            let ctx = MonitorContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                healthmonitor: monitor.clone(),
            };
            if let Err(e) = self.builders.monitors.delete(&ctx, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.healthmonitors[i].provisioning_status,
                    "healthmonitor",
                    &ctx.healthmonitor.id,
                    e,
                ));
            }
        }
        Ok(())
    }

    /// Members go away with their pool even when they are not marked themselves
    pub(crate) async fn assure_members_deleted(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
        hints: &mut SubnetHints,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();
        let mut tracker = SubnetHintTracker::new(hints, &devices);

        for i in 0..service.members.len() {
            let member = &service.members[i];
            let pool = index
                .pool(service, &member.pool_id)
                .ok_or_else(|| missing("pool", &member.pool_id))?;

            if member.port.is_none() && !member.provisioning_status.is_pending_delete() {
                warn!("Member {} definition does not include a port", member.id);
            }
            if !member.provisioning_status.is_pending_delete() && !pool.provisioning_status.is_pending_delete() {
                continue;
            }

            let ctx = MemberContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                member: member.clone(),
            };
            let member = &ctx.member;
            if let Err(e) = self.builders.members.delete(&ctx, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.members[i].provisioning_status,
                    "member",
                    &member.id,
                    e,
                ));
            }

            let network_id = member.network_id.clone().unwrap_or_default();
            tracker.update(ProvisioningStatus::PendingDelete, &member.subnet_id, &network_id, true);
        }
        Ok(())
    }

    pub(crate) async fn assure_l7rules_deleted(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.l7policy_rules.len() {
            let rule = &service.l7policy_rules[i];
            if !rule.provisioning_status.is_pending_delete() {
                continue;
            }

            let policy = index
                .l7policy(service, &rule.policy_id)
                .ok_or_else(|| missing("l7policy", &rule.policy_id))?;
            if policy.name.as_deref().is_some_and(|name| self.config.is_esd(name)) {
                continue;
            }

            let ctx = L7RuleContext {
                loadbalancer: service.loadbalancer.clone(),
                l7policy: policy.clone(),
                l7rule: rule.clone(),
            };
            if let Err(e) = self.builders.l7rules.delete(&ctx, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.l7policy_rules[i].provisioning_status,
                    "l7rule",
                    &ctx.l7rule.id,
                    e,
                ));
            }
        }
        Ok(())
    }

    pub(crate) async fn assure_l7policies_deleted(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.l7policies.len() {
            let policy = &service.l7policies[i];
            if !policy.provisioning_status.is_pending_delete() {
                continue;
            }
            if policy.name.as_deref().is_some_and(|name| self.config.is_esd(name)) {
                continue;
            }

            let listener = index
                .listener(service, &policy.listener_id)
                .ok_or_else(|| missing("listener", &policy.listener_id))?;
            let ctx = L7PolicyContext {
                loadbalancer: service.loadbalancer.clone(),
                listener: listener.clone(),
                l7policy: policy.clone(),
            };
            if let Err(e) = self.builders.l7policies.delete(&ctx, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.l7policies[i].provisioning_status,
                    "l7policy",
                    &ctx.l7policy.id,
                    e,
                ));
            }
        }
        Ok(())
    }

    /// Detach the pool from its listeners, then delete it
    pub(crate) async fn assure_pools_deleted(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.pools.len() {
            let pool = &service.pools[i];
            if !pool.provisioning_status.is_pending_delete() {
                continue;
            }

            let listeners: Vec<ListenerContext> = pool
                .listeners
                .iter()
                .filter_map(|listener_ref| index.listener(service, &listener_ref.id))
                .map(|listener| ListenerContext {
                    loadbalancer: service.loadbalancer.clone(),
                    listener: listener.clone(),
                    pool: None,
                })
                .collect();
            let ctx = PoolContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                members: service.pool_members(&pool.id),
            };

            if let Err(e) = self.delete_pool(&ctx, &listeners, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.pools[i].provisioning_status,
                    "pool",
                    &ctx.pool.id,
                    e,
                ));
            }
        }
        Ok(())
    }

    async fn delete_pool(
        &self,
        ctx: &PoolContext,
        listeners: &[ListenerContext],
        devices: &[Device],
    ) -> Result<(), DeviceError> {
        for listener in listeners {
            debug!("Detaching pool {} from listener {}", ctx.pool.id, listener.listener.id);
            tolerate_not_found(self.builders.listeners.update_listener_pool(listener, devices).await)?;
            tolerate_not_found(self.builders.listeners.remove_session_persistence(listener, devices).await)?;
        }
        self.builders.pools.delete(ctx, devices).await
    }

    /// Session persistence is removed on a best-effort basis before the listener goes
    pub(crate) async fn assure_listeners_deleted(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.listeners.len() {
            let listener = &service.listeners[i];
            if !listener.provisioning_status.is_pending_delete() {
                continue;
            }

            let ctx = ListenerContext {
                loadbalancer: service.loadbalancer.clone(),
                listener: listener.clone(),
                pool: None,
            };
            if let Err(e) = self.builders.listeners.remove_session_persistence(&ctx, &devices).await {
                warn!("Could not remove session persistence of listener {}: {}", ctx.listener.id, e);
            }
            if let Err(e) = self.builders.listeners.delete(&ctx, &devices).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.listeners[i].provisioning_status,
                    "listener",
                    &ctx.listener.id,
                    e,
                ));
            }
        }
        Ok(())
    }

    /// Withdraw the VIP and delete the virtual address of a load balancer being deleted
    pub(crate) async fn assure_loadbalancer_deleted(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        let loadbalancer = &service.loadbalancer;
        if !loadbalancer.provisioning_status.is_pending_delete() {
            return Ok(());
        }

        let devices = self.device_client.configured_devices();
        let ctx = LoadBalancerContext {
            loadbalancer: loadbalancer.clone(),
        };
        let result = match self.unbind_vip(&ctx).await {
            Ok(()) => self.builders.loadbalancers.delete(&ctx, &devices).await,
            Err(e) => Err(e),
        };
        if let Err(source) = result {
            error!("Failed to delete virtual address of load balancer {}: {}", ctx.loadbalancer.id, source);
            service.loadbalancer.provisioning_status = ProvisioningStatus::Error;
            return Err(ReconcileError::Resource {
                kind: "loadbalancer",
                id: ctx.loadbalancer.id,
                source,
            });
        }
        Ok(())
    }

    async fn unbind_vip(&self, ctx: &LoadBalancerContext) -> Result<(), DeviceError> {
        let Some(l3_binding) = &self.l3_binding else {
            return Ok(());
        };
        let loadbalancer = &ctx.loadbalancer;
        l3_binding
            .unbind_address(&loadbalancer.vip_subnet_id, strip_route_domain(&loadbalancer.vip_address))
            .await
    }
}
