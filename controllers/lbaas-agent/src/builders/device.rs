//! Device-backed resource builders
//!
//! Resources become LTM objects named `{prefix}_{id}` in the tenant folder.
//! Attribute bodies only carry fields that are set, so re-applying an
//! unchanged resource leaves the stored object untouched.

use super::*;
use device_client::LtmObject;
use device_client::ObjectKind;
use serde_json::{Map, Value, json};
use tracing::debug;

/// JSON object from the fields that are present
fn body<const N: usize>(fields: [(&str, Option<Value>); N]) -> Value {
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect();
    Value::Object(map)
}

/// Resource builders talking to the device fleet
pub struct DeviceBuilders {
    config: Arc<AgentConfig>,
    device_client: Arc<dyn DeviceClientTrait>,
}

impl DeviceBuilders {
    pub fn new(config: Arc<AgentConfig>, device_client: Arc<dyn DeviceClientTrait>) -> Self {
        Self { config, device_client }
    }

    fn folder(&self, loadbalancer: &LoadBalancer) -> String {
        self.config.folder_name(&loadbalancer.tenant_id)
    }

    fn object(&self, kind: ObjectKind, loadbalancer: &LoadBalancer, id: &str, body: Value) -> LtmObject {
        LtmObject::new(kind, self.folder(loadbalancer), self.config.object_name(id)).with_body(body)
    }

    /// Create on every device; Conflict is reported once all devices were tried
    async fn create_on(&self, object: &LtmObject, devices: &[Device]) -> Result<(), DeviceError> {
        let mut conflict = None;
        for device in devices {
            match self.device_client.create_object(device, object).await {
                Ok(()) => debug!("Created {} on {}", object.full_path(), device),
                Err(DeviceError::Conflict(message)) => {
                    conflict.get_or_insert(DeviceError::Conflict(message));
                }
                Err(e) => return Err(e),
            }
        }
        conflict.map_or(Ok(()), Err)
    }

    /// Update on every device; NotFound is reported once all devices were tried
    async fn update_on(&self, object: &LtmObject, devices: &[Device]) -> Result<(), DeviceError> {
        let mut missing = None;
        for device in devices {
            match self.device_client.update_object(device, object).await {
                Ok(()) => {}
                Err(DeviceError::NotFound(message)) => {
                    missing.get_or_insert(DeviceError::NotFound(message));
                }
                Err(e) => return Err(e),
            }
        }
        missing.map_or(Ok(()), Err)
    }

    async fn delete_on(&self, object: &LtmObject, devices: &[Device]) -> Result<(), DeviceError> {
        for device in devices {
            match self
                .device_client
                .delete_object(device, object.kind, &object.partition, &object.name)
                .await
            {
                Ok(()) => debug!("Deleted {} on {}", object.full_path(), device),
                Err(DeviceError::NotFound(_)) => debug!("{} already gone on {}", object.full_path(), device),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn virtual_address(&self, ctx: &LoadBalancerContext) -> LtmObject {
        let lb = &ctx.loadbalancer;
        let body = json!({
            "address": lb.vip_address,
            "traffic_group": self.config.traffic_group,
        });
        self.object(ObjectKind::VirtualAddress, lb, &lb.id, body)
    }

    fn pool(&self, ctx: &PoolContext) -> LtmObject {
        let pool = &ctx.pool;
        let body = json!({
            "lb_method": pool.lb_algorithm,
            "loadbalancer": self.config.object_name(&ctx.loadbalancer.id),
        });
        self.object(ObjectKind::Pool, &ctx.loadbalancer, &pool.id, body)
    }

    fn listener(&self, ctx: &ListenerContext) -> LtmObject {
        let listener = &ctx.listener;
        let body = body([
            (
                "destination",
                Some(json!(format!("{}:{}", ctx.loadbalancer.vip_address, listener.protocol_port))),
            ),
            ("protocol", Some(json!(listener.protocol))),
            ("connection_limit", Some(json!(listener.connection_limit))),
            ("pool", ctx.pool.as_ref().map(|p| json!(self.config.object_name(&p.id)))),
        ]);
        self.object(ObjectKind::Listener, &ctx.loadbalancer, &listener.id, body)
    }

    /// Listener object carrying only the given attributes, for partial updates
    fn listener_patch(&self, ctx: &ListenerContext, patch: Value) -> LtmObject {
        self.object(ObjectKind::Listener, &ctx.loadbalancer, &ctx.listener.id, patch)
    }

    fn member(&self, ctx: &MemberContext) -> LtmObject {
        let member = &ctx.member;
        let body = json!({
            "address": member.address,
            "port": member.protocol_port,
            "weight": member.weight,
            "pool": self.config.object_name(&ctx.pool.id),
        });
        self.object(ObjectKind::Member, &ctx.loadbalancer, &member.id, body)
    }

    fn monitor(&self, ctx: &MonitorContext) -> LtmObject {
        let monitor = &ctx.healthmonitor;
        let body = json!({
            "type": monitor.monitor_type,
            "delay": monitor.delay,
            "timeout": monitor.timeout,
            "max_retries": monitor.max_retries,
            "pool": self.config.object_name(&ctx.pool.id),
        });
        self.object(ObjectKind::Monitor, &ctx.loadbalancer, &monitor.id, body)
    }

    fn l7policy(&self, ctx: &L7PolicyContext) -> LtmObject {
        let policy = &ctx.l7policy;
        let body = body([
            ("listener", Some(json!(self.config.object_name(&ctx.listener.id)))),
            ("action", Some(json!(policy.action))),
            ("position", Some(json!(policy.position))),
            (
                "redirect_pool",
                policy.redirect_pool_id.as_ref().map(|id| json!(self.config.object_name(id))),
            ),
            ("redirect_url", policy.redirect_url.as_ref().map(|url| json!(url))),
        ]);
        self.object(ObjectKind::L7Policy, &ctx.loadbalancer, &policy.id, body)
    }

    fn l7rule(&self, ctx: &L7RuleContext) -> LtmObject {
        let rule = &ctx.l7rule;
        let body = body([
            ("policy", Some(json!(self.config.object_name(&ctx.l7policy.id)))),
            ("type", Some(json!(rule.rule_type))),
            ("compare_type", Some(json!(rule.compare_type))),
            ("key", rule.key.as_ref().map(|key| json!(key))),
            ("value", Some(json!(rule.value))),
            ("invert", Some(json!(rule.invert))),
        ]);
        self.object(ObjectKind::L7Rule, &ctx.loadbalancer, &rule.id, body)
    }
}

/// CRUD over the object a context maps to
macro_rules! ltm_resource_builder {
    ($ctx:ty, $object:ident) => {
        #[async_trait::async_trait]
        impl ResourceBuilder<$ctx> for DeviceBuilders {
            async fn create(&self, ctx: &$ctx, devices: &[Device]) -> Result<(), DeviceError> {
                self.create_on(&self.$object(ctx), devices).await
            }

            async fn update(&self, ctx: &$ctx, devices: &[Device]) -> Result<(), DeviceError> {
                self.update_on(&self.$object(ctx), devices).await
            }

            async fn delete(&self, ctx: &$ctx, devices: &[Device]) -> Result<(), DeviceError> {
                self.delete_on(&self.$object(ctx), devices).await
            }
        }
    };
}

ltm_resource_builder!(LoadBalancerContext, virtual_address);
ltm_resource_builder!(PoolContext, pool);
ltm_resource_builder!(ListenerContext, listener);
ltm_resource_builder!(MemberContext, member);
ltm_resource_builder!(MonitorContext, monitor);
ltm_resource_builder!(L7PolicyContext, l7policy);
ltm_resource_builder!(L7RuleContext, l7rule);

#[async_trait::async_trait]
impl ListenerBuilder for DeviceBuilders {
    async fn update_listener_pool(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError> {
        let pool = ctx.pool.as_ref().map(|p| self.config.object_name(&p.id));
        let patch = self.listener_patch(ctx, json!({ "pool": pool }));
        self.update_on(&patch, devices).await
    }

    async fn update_session_persistence(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError> {
        let persistence = ctx
            .pool
            .as_ref()
            .and_then(|p| p.session_persistence.as_ref())
            .map(|persistence| {
                body([
                    ("type", Some(json!(persistence.persistence_type))),
                    ("cookie_name", persistence.cookie_name.as_ref().map(|name| json!(name))),
                ])
            });
        let patch = self.listener_patch(ctx, json!({ "persistence": persistence }));
        self.update_on(&patch, devices).await
    }

    async fn remove_session_persistence(&self, ctx: &ListenerContext, devices: &[Device]) -> Result<(), DeviceError> {
        let patch = self.listener_patch(ctx, json!({ "persistence": null }));
        self.update_on(&patch, devices).await
    }

    async fn get_stats(&self, ctx: &ListenerContext, keys: &[String], devices: &[Device]) -> Result<ObjectStats, DeviceError> {
        let folder = self.folder(&ctx.loadbalancer);
        let name = self.config.object_name(&ctx.listener.id);
        let mut totals: ObjectStats = keys.iter().map(|key| (key.clone(), 0)).collect();
        for device in devices {
            let stats = self
                .device_client
                .object_stats(device, ObjectKind::Listener, &folder, &name, keys)
                .await?;
            for (key, value) in stats {
                *totals.entry(key).or_insert(0) += value;
            }
        }
        Ok(totals)
    }
}

#[async_trait::async_trait]
impl MemberBuilder for DeviceBuilders {
    async fn member_status(&self, ctx: &MemberContext, device: &Device) -> Result<MemberState, DeviceError> {
        let folder = self.folder(&ctx.loadbalancer);
        let name = self.config.object_name(&ctx.member.id);
        self.device_client.member_state(device, &folder, &name).await
    }
}
