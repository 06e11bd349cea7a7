//! Resource builders
//!
//! A builder turns one resource of a service definition into device
//! configuration. The reconciler hands it a small context holding the
//! resource plus whatever it references (the pool of a member, the listener
//! of a policy) and the devices to act on.
//!
//! Every operation fans out over the given devices and reports the
//! outcome as a [`DeviceError`] kind:
//! - `create` returns [`DeviceError::Conflict`] when the object already existed
//! - `update` returns [`DeviceError::NotFound`] when the object was missing
//! - `delete` succeeds for objects that are already gone

mod device;

pub use device::DeviceBuilders;

use crate::config::AgentConfig;
use device_client::{Device, DeviceClientTrait, DeviceError, MemberState, ObjectStats};
use lbaas_model::{HealthMonitor, L7Policy, L7Rule, Listener, LoadBalancer, Member, Pool};
use std::sync::Arc;

/// Context for the load balancer's virtual address
#[derive(Debug, Clone)]
pub struct LoadBalancerContext {
    pub loadbalancer: LoadBalancer,
}

#[derive(Debug, Clone)]
pub struct PoolContext {
    pub loadbalancer: LoadBalancer,
    pub pool: Pool,
    pub members: Vec<Member>,
}

/// Context for a listener; `pool` is the pool to attach, if any
#[derive(Debug, Clone)]
pub struct ListenerContext {
    pub loadbalancer: LoadBalancer,
    pub listener: Listener,
    pub pool: Option<Pool>,
}

#[derive(Debug, Clone)]
pub struct MemberContext {
    pub loadbalancer: LoadBalancer,
    pub pool: Pool,
    pub member: Member,
}

#[derive(Debug, Clone)]
pub struct MonitorContext {
    pub loadbalancer: LoadBalancer,
    pub pool: Pool,
    pub healthmonitor: HealthMonitor,
}

#[derive(Debug, Clone)]
pub struct L7PolicyContext {
    pub loadbalancer: LoadBalancer,
    pub listener: Listener,
    pub l7policy: L7Policy,
}

#[derive(Debug, Clone)]
pub struct L7RuleContext {
    pub loadbalancer: LoadBalancer,
    pub l7policy: L7Policy,
    pub l7rule: L7Rule,
}

/// Create, update and delete one kind of resource on a set of devices
#[async_trait::async_trait]
pub trait ResourceBuilder<C: Send + Sync>: Send + Sync {
    async fn create(&self, ctx: &C, devices: &[Device]) -> Result<(), DeviceError>;
    async fn update(&self, ctx: &C, devices: &[Device]) -> Result<(), DeviceError>;
    async fn delete(&self, ctx: &C, devices: &[Device]) -> Result<(), DeviceError>;
}

/// Listener operations beyond plain CRUD
#[async_trait::async_trait]
pub trait ListenerBuilder: ResourceBuilder<ListenerContext> {
    /// Point the listener at `ctx.pool`, or detach it when `None`
    async fn update_listener_pool(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError>;

    /// Apply the session persistence of `ctx.pool` (clearing it if the pool has none)
    async fn update_session_persistence(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError>;

    async fn remove_session_persistence(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError>;

    /// Counters of the listener summed over `devices`
    async fn get_stats(&self, ctx: &ListenerContext, keys: &[String], devices: &[Device]) -> Result<ObjectStats, DeviceError>;
}

/// Member operations beyond plain CRUD
#[async_trait::async_trait]
pub trait MemberBuilder: ResourceBuilder<MemberContext> {
    /// Live health of the member on one device
    async fn member_status(&self, ctx: &MemberContext, device: &Device) -> Result<MemberState, DeviceError>;
}

/// One builder per resource kind
#[derive(Clone)]
pub struct Builders {
    pub loadbalancers: Arc<dyn ResourceBuilder<LoadBalancerContext>>,
    pub pools: Arc<dyn ResourceBuilder<PoolContext>>,
    pub listeners: Arc<dyn ListenerBuilder>,
    pub members: Arc<dyn MemberBuilder>,
    pub monitors: Arc<dyn ResourceBuilder<MonitorContext>>,
    pub l7policies: Arc<dyn ResourceBuilder<L7PolicyContext>>,
    pub l7rules: Arc<dyn ResourceBuilder<L7RuleContext>>,
}

impl Builders {
    /// Builders mapping every resource onto device LTM objects
    pub fn device(config: Arc<AgentConfig>, device_client: Arc<dyn DeviceClientTrait>) -> Self {
        let builders = Arc::new(DeviceBuilders::new(config, device_client));
        Self {
            loadbalancers: builders.clone(),
            pools: builders.clone(),
            listeners: builders.clone(),
            members: builders.clone(),
            monitors: builders.clone(),
            l7policies: builders.clone(),
            l7rules: builders,
        }
    }
}
