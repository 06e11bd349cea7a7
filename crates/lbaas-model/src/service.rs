//! Service definition aggregate

use crate::l7::{L7Policy, L7Rule};
use crate::listener::Listener;
use crate::loadbalancer::LoadBalancer;
use crate::network::{Network, Subnet};
use crate::pool::{HealthMonitor, Member, Pool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Desired state of one load balancer and everything hanging off it.
///
/// Built by the caller for one reconciliation pass and mutated in place:
/// provisioning status is written back and addresses are annotated with
/// their route domain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ServiceDefinition {
    /// The load balancer
    pub loadbalancer: LoadBalancer,

    /// Listeners, in caller order
    #[serde(default)]
    pub listeners: Vec<Listener>,

    /// Pools, in caller order
    #[serde(default)]
    pub pools: Vec<Pool>,

    /// Members of all pools
    #[serde(default)]
    pub members: Vec<Member>,

    /// Health monitors of all pools
    #[serde(default)]
    pub healthmonitors: Vec<HealthMonitor>,

    /// L7 policies of all listeners
    #[serde(default)]
    pub l7policies: Vec<L7Policy>,

    /// L7 rules of all policies
    #[serde(default)]
    pub l7policy_rules: Vec<L7Rule>,

    /// Networks by id
    #[serde(default)]
    pub networks: BTreeMap<String, Network>,

    /// Subnets by id
    #[serde(default)]
    pub subnets: BTreeMap<String, Subnet>,
}

impl ServiceDefinition {
    /// Network by id
    pub fn network(&self, network_id: &str) -> Option<&Network> {
        self.networks.get(network_id)
    }

    /// Subnet by id
    pub fn subnet(&self, subnet_id: &str) -> Option<&Subnet> {
        self.subnets.get(subnet_id)
    }

    /// Members belonging to a pool
    pub fn pool_members(&self, pool_id: &str) -> Vec<Member> {
        self.members
            .iter()
            .filter(|m| m.pool_id == pool_id)
            .cloned()
            .collect()
    }

    /// Rules belonging to a policy
    pub fn policy_rules(&self, policy_id: &str) -> Vec<L7Rule> {
        self.l7policy_rules
            .iter()
            .filter(|r| r.policy_id == policy_id)
            .cloned()
            .collect()
    }
}

/// Id-to-position lookup tables over a service definition.
///
/// Built once per reconciliation pass. The resource vectors never change
/// length during a pass, so positions stay valid while statuses are mutated.
#[derive(Debug, Clone, Default)]
pub struct ServiceIndex {
    pools: HashMap<String, usize>,
    listeners: HashMap<String, usize>,
    l7policies: HashMap<String, usize>,
}

impl ServiceIndex {
    /// Index the pools, listeners and L7 policies of a service
    pub fn build(service: &ServiceDefinition) -> Self {
        Self {
            pools: positions(service.pools.iter().map(|p| &p.id)),
            listeners: positions(service.listeners.iter().map(|l| &l.id)),
            l7policies: positions(service.l7policies.iter().map(|p| &p.id)),
        }
    }

    /// Pool by id
    pub fn pool<'a>(&self, service: &'a ServiceDefinition, pool_id: &str) -> Option<&'a Pool> {
        self.pools.get(pool_id).and_then(|&i| service.pools.get(i))
    }

    /// Listener by id
    pub fn listener<'a>(&self, service: &'a ServiceDefinition, listener_id: &str) -> Option<&'a Listener> {
        self.listeners.get(listener_id).and_then(|&i| service.listeners.get(i))
    }

    /// L7 policy by id
    pub fn l7policy<'a>(&self, service: &'a ServiceDefinition, policy_id: &str) -> Option<&'a L7Policy> {
        self.l7policies.get(policy_id).and_then(|&i| service.l7policies.get(i))
    }
}

fn positions<'a>(ids: impl Iterator<Item = &'a String>) -> HashMap<String, usize> {
    ids.enumerate().map(|(i, id)| (id.clone(), i)).collect()
}
