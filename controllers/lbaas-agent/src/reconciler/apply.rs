//! Apply pipeline

use super::{ServiceReconciler, missing, resource_error, upsert};
use crate::builders::{
    L7PolicyContext, L7RuleContext, ListenerContext, LoadBalancerContext, MemberContext, MonitorContext, PoolContext,
    ResourceBuilder,
};
use crate::error::ReconcileError;
use crate::subnet_hints::SubnetHintTracker;
use device_client::{Device, DeviceError};
use lbaas_model::{ProvisioningStatus, ServiceDefinition, ServiceIndex, SubnetHints, strip_route_domain};
use tracing::{debug, error, warn};

impl ServiceReconciler {
    /// Assure the virtual address and record the VIP subnet in the hints.
    ///
    /// Runs in both pipelines. A load balancer being deleted only updates
    /// the hints; its virtual address goes away at the end of the delete
    /// pipeline.
    pub(crate) async fn assure_loadbalancer_created(
        &self,
        service: &mut ServiceDefinition,
        hints: &mut SubnetHints,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();
        let loadbalancer = &service.loadbalancer;
        let status = loadbalancer.provisioning_status;
        let id = loadbalancer.id.clone();

        if status == ProvisioningStatus::Error {
            debug!("Load balancer {} is in ERROR, skipping", id);
            return Ok(());
        }

        if !status.is_pending_delete() {
            let ctx = LoadBalancerContext {
                loadbalancer: loadbalancer.clone(),
            };
            let result = match upsert(&*self.builders.loadbalancers, &ctx, &devices, status, "loadbalancer", &id).await {
                Ok(()) => self.bind_vip(&ctx).await,
                Err(e) => Err(e),
            };
            if let Err(source) = result {
                error!("Failed to assure virtual address of load balancer {}: {}", id, source);
                service.loadbalancer.provisioning_status = ProvisioningStatus::Error;
                return Err(ReconcileError::Resource {
                    kind: "loadbalancer",
                    id,
                    source,
                });
            }
        }

        let loadbalancer = &service.loadbalancer;
        let network_id = loadbalancer.network_id.clone().unwrap_or_default();
        SubnetHintTracker::new(hints, &devices).update(status, &loadbalancer.vip_subnet_id, &network_id, false);

        if !status.is_pending_delete() {
            service.loadbalancer.provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    async fn bind_vip(&self, ctx: &LoadBalancerContext) -> Result<(), DeviceError> {
        let Some(l3_binding) = &self.l3_binding else {
            return Ok(());
        };
        let loadbalancer = &ctx.loadbalancer;
        l3_binding
            .bind_address(&loadbalancer.vip_subnet_id, strip_route_domain(&loadbalancer.vip_address))
            .await
    }

    pub(crate) async fn assure_pools_created(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.pools.len() {
            let pool = &service.pools[i];
            let status = pool.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
                continue;
            }

            let ctx = PoolContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                members: service.pool_members(&pool.id),
            };
            if let Err(e) = upsert(&*self.builders.pools, &ctx, &devices, status, "pool", &ctx.pool.id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.pools[i].provisioning_status,
                    "pool",
                    &ctx.pool.id,
                    e,
                ));
            }
            service.pools[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    /// Listeners are created with their default pool attached, if that pool is known
    /// and neither in ERROR nor being deleted
    pub(crate) async fn assure_listeners_created(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.listeners.len() {
            let listener = &service.listeners[i];
            let status = listener.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
                continue;
            }

            let pool = listener
                .default_pool_id
                .as_deref()
                .and_then(|pool_id| index.pool(service, pool_id))
                .filter(|pool| {
                    let pool_status = pool.provisioning_status;
                    !pool_status.is_pending_delete() && pool_status != ProvisioningStatus::Error
                })
                .cloned();
            let ctx = ListenerContext {
                loadbalancer: service.loadbalancer.clone(),
                listener: listener.clone(),
                pool,
            };
            let id = &ctx.listener.id;
            if let Err(e) = upsert(&*self.builders.listeners, &ctx, &devices, status, "listener", id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.listeners[i].provisioning_status,
                    "listener",
                    id,
                    e,
                ));
            }
            service.listeners[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    pub(crate) async fn assure_monitors_created(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.healthmonitors.len() {
            let monitor = &service.healthmonitors[i];
            let status = monitor.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
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
            let id = &ctx.healthmonitor.id;
            if let Err(e) = upsert(&*self.builders.monitors, &ctx, &devices, status, "healthmonitor", id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.healthmonitors[i].provisioning_status,
                    "healthmonitor",
                    id,
                    e,
                ));
            }
            service.healthmonitors[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    /// Members of pools being deleted are left to the delete pipeline
    pub(crate) async fn assure_members_created(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
        hints: &mut SubnetHints,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();
        let mut tracker = SubnetHintTracker::new(hints, &devices);

        for i in 0..service.members.len() {
            let member = &service.members[i];
            let status = member.provisioning_status;
            if status == ProvisioningStatus::Error {
                continue;
            }
            let pool = index
                .pool(service, &member.pool_id)
                .ok_or_else(|| missing("pool", &member.pool_id))?;

            if member.port.is_none() && !status.is_pending_delete() {
                warn!("Member {} definition does not include a port", member.id);
            }
            if status.is_pending_delete() || pool.provisioning_status.is_pending_delete() {
                continue;
            }

            let ctx = MemberContext {
                loadbalancer: service.loadbalancer.clone(),
                pool: pool.clone(),
                member: member.clone(),
            };
            let id = &ctx.member.id;
            if let Err(e) = upsert(&*self.builders.members, &ctx, &devices, status, "member", id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.members[i].provisioning_status,
                    "member",
                    id,
                    e,
                ));
            }

            let network_id = ctx.member.network_id.clone().unwrap_or_default();
            tracker.update(status, &ctx.member.subnet_id, &network_id, true);
            service.members[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    /// Attach every pool to its listeners and apply session persistence.
    ///
    /// Listeners in ERROR or being deleted are left alone. The pool itself is
    /// updated once more afterwards.
    pub(crate) async fn assure_pools_configured(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.pools.len() {
            let pool = &service.pools[i];
            let status = pool.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
                continue;
            }

            let pool = pool.clone();
            let mut result = Ok(());
            for listener_ref in &pool.listeners {
                let Some(listener) = index.listener(service, &listener_ref.id) else {
                    warn!("Listener {} of pool {} is not part of the service", listener_ref.id, pool.id);
                    continue;
                };
                let listener_status = listener.provisioning_status;
                if listener_status.is_pending_delete() || listener_status == ProvisioningStatus::Error {
                    debug!(
                        "Listener {} is {}, not attaching pool {}",
                        listener.id, listener_status, pool.id
                    );
                    continue;
                }
                let ctx = ListenerContext {
                    loadbalancer: service.loadbalancer.clone(),
                    listener: listener.clone(),
                    pool: Some(pool.clone()),
                };
                result = self.attach_pool(&ctx, &devices).await;
                if result.is_err() {
                    break;
                }
            }

            if result.is_ok() {
                let ctx = PoolContext {
                    loadbalancer: service.loadbalancer.clone(),
                    members: service.pool_members(&pool.id),
                    pool: pool.clone(),
                };
                result = self.builders.pools.update(&ctx, &devices).await;
            }

            if let Err(e) = result {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.pools[i].provisioning_status,
                    "pool",
                    &pool.id,
                    e,
                ));
            }
            service.pools[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    async fn attach_pool(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError> {
        self.builders.listeners.update_listener_pool(ctx, devices).await?;
        self.builders.listeners.update_session_persistence(ctx, devices).await
    }

    /// Policies named after an enhanced service definition are not device objects
    pub(crate) async fn assure_l7policies_created(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.l7policies.len() {
            let policy = &service.l7policies[i];
            let status = policy.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
                continue;
            }
            if policy.name.as_deref().is_some_and(|name| self.config.is_esd(name)) {
                debug!("L7 policy {} is an ESD, skipping", policy.id);
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
            let id = &ctx.l7policy.id;
            if let Err(e) = upsert(&*self.builders.l7policies, &ctx, &devices, status, "l7policy", id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.l7policies[i].provisioning_status,
                    "l7policy",
                    id,
                    e,
                ));
            }
            service.l7policies[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }

    pub(crate) async fn assure_l7rules_created(
        &self,
        service: &mut ServiceDefinition,
        index: &ServiceIndex,
    ) -> Result<(), ReconcileError> {
        let devices = self.device_client.configured_devices();

        for i in 0..service.l7policy_rules.len() {
            let rule = &service.l7policy_rules[i];
            let status = rule.provisioning_status;
            if status.is_pending_delete() || status == ProvisioningStatus::Error {
                continue;
            }

            let policy = index
                .l7policy(service, &rule.policy_id)
                .ok_or_else(|| missing("l7policy", &rule.policy_id))?;
            if let Some(name) = policy.name.as_deref().filter(|name| self.config.is_esd(name)) {
                error!("L7 policy {} is an ESD. Cannot add an L7 rule to an ESD.", name);
                continue;
            }

            let ctx = L7RuleContext {
                loadbalancer: service.loadbalancer.clone(),
                l7policy: policy.clone(),
                l7rule: rule.clone(),
            };
            let id = &ctx.l7rule.id;
            if let Err(e) = upsert(&*self.builders.l7rules, &ctx, &devices, status, "l7rule", id).await {
                return Err(resource_error(
                    &mut service.loadbalancer,
                    &mut service.l7policy_rules[i].provisioning_status,
                    "l7rule",
                    id,
                    e,
                ));
            }
            service.l7policy_rules[i].provisioning_status = ProvisioningStatus::Active;
        }
        Ok(())
    }
}
