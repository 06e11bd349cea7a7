//! Agent configuration
//!
//! Defaults, optionally overlaid by a YAML file named in `AGENT_CONFIG`,
//! then overridden field by field from `LBAAS_*` environment variables.

use crate::error::ReconcileError;
use lbaas_model::Network;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Deployment settings the reconciliation engine consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Prefix of device folders and object names (`{prefix}_{id}`)
    pub environment_prefix: String,
    /// All addresses live in the global route domain; no network attachment work
    pub global_routed_mode: bool,
    /// Place tenant addresses into route domains
    pub use_namespaces: bool,
    /// Route domain capacity per tenant
    pub max_namespaces_per_tenant: usize,
    /// Strictness flag for newly created route domains
    pub route_domain_strictness: bool,
    /// When false the devices answer as default gateway of member subnets
    pub snat_mode: bool,
    /// `>0` SNAT pool size per subnet, `-1` reuse the VIP, `0` no SNAT
    pub snat_addresses_per_subnet: i32,
    /// Purge static ARP entries when a subnet is torn down
    pub populate_static_arp: bool,
    /// Networks that live in the `Common` partition
    pub common_network_ids: Vec<String>,
    /// Physical network used for hierarchical port binding
    pub network_segment_physical_network: Option<String>,
    /// Traffic group for virtual addresses and gateway self-IPs
    pub traffic_group: String,
    /// L7 policy names that are enhanced service definitions
    pub esd_names: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            environment_prefix: "Project".to_string(),
            global_routed_mode: false,
            use_namespaces: true,
            max_namespaces_per_tenant: 1,
            route_domain_strictness: false,
            snat_mode: true,
            snat_addresses_per_subnet: 1,
            populate_static_arp: false,
            common_network_ids: Vec::new(),
            network_segment_physical_network: None,
            traffic_group: "traffic-group-1".to_string(),
            esd_names: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load from `AGENT_CONFIG` (if set) and the process environment
    pub fn load() -> Result<Self, ReconcileError> {
        let base = match env::var("AGENT_CONFIG") {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    ReconcileError::InvalidConfig(format!("cannot read {}: {}", path, e))
                })?;
                Self::from_yaml(&contents)?
            }
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| env::var(key).ok())
    }

    /// Parse a YAML document; missing fields keep their defaults
    pub fn from_yaml(contents: &str) -> Result<Self, ReconcileError> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| ReconcileError::InvalidConfig(format!("invalid agent config: {}", e)))?;
        config.validate()
    }

    /// Apply `LBAAS_*` overrides from `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ReconcileError> {
        if let Some(v) = lookup("LBAAS_ENVIRONMENT_PREFIX") {
            self.environment_prefix = v;
        }
        if let Some(v) = lookup("LBAAS_GLOBAL_ROUTED_MODE") {
            self.global_routed_mode = parse_bool("LBAAS_GLOBAL_ROUTED_MODE", &v)?;
        }
        if let Some(v) = lookup("LBAAS_USE_NAMESPACES") {
            self.use_namespaces = parse_bool("LBAAS_USE_NAMESPACES", &v)?;
        }
        if let Some(v) = lookup("LBAAS_MAX_NAMESPACES_PER_TENANT") {
            self.max_namespaces_per_tenant = parse_number("LBAAS_MAX_NAMESPACES_PER_TENANT", &v)?;
        }
        if let Some(v) = lookup("LBAAS_ROUTE_DOMAIN_STRICTNESS") {
            self.route_domain_strictness = parse_bool("LBAAS_ROUTE_DOMAIN_STRICTNESS", &v)?;
        }
        if let Some(v) = lookup("LBAAS_SNAT_MODE") {
            self.snat_mode = parse_bool("LBAAS_SNAT_MODE", &v)?;
        }
        if let Some(v) = lookup("LBAAS_SNAT_ADDRESSES_PER_SUBNET") {
            self.snat_addresses_per_subnet = parse_number("LBAAS_SNAT_ADDRESSES_PER_SUBNET", &v)?;
        }
        if let Some(v) = lookup("LBAAS_POPULATE_STATIC_ARP") {
            self.populate_static_arp = parse_bool("LBAAS_POPULATE_STATIC_ARP", &v)?;
        }
        if let Some(v) = lookup("LBAAS_COMMON_NETWORK_IDS") {
            self.common_network_ids = parse_list(&v);
        }
        if let Some(v) = lookup("LBAAS_NETWORK_SEGMENT_PHYSICAL_NETWORK") {
            self.network_segment_physical_network = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("LBAAS_TRAFFIC_GROUP") {
            self.traffic_group = v;
        }
        if let Some(v) = lookup("LBAAS_ESD_NAMES") {
            self.esd_names = parse_list(&v);
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, ReconcileError> {
        if self.max_namespaces_per_tenant == 0 {
            return Err(ReconcileError::InvalidConfig(
                "max_namespaces_per_tenant must be at least 1".to_string(),
            ));
        }
        if self.snat_addresses_per_subnet < -1 {
            return Err(ReconcileError::InvalidConfig(format!(
                "snat_addresses_per_subnet must be -1 or more, got {}",
                self.snat_addresses_per_subnet
            )));
        }
        Ok(self)
    }

    /// Device folder (partition) of a tenant
    pub fn folder_name(&self, tenant_id: &str) -> String {
        format!("{}_{}", self.environment_prefix, tenant_id)
    }

    /// Device object name of a resource
    pub fn object_name(&self, id: &str) -> String {
        format!("{}_{}", self.environment_prefix, id)
    }

    /// Shared and explicitly listed networks live in `Common`
    pub fn is_common_network(&self, network: &Network) -> bool {
        network.shared || self.common_network_ids.iter().any(|id| *id == network.id)
    }

    /// Folder a network's L2 objects and self-IPs are created in
    pub fn network_folder(&self, network: &Network, tenant_id: &str) -> String {
        if self.is_common_network(network) {
            "Common".to_string()
        } else {
            self.folder_name(tenant_id)
        }
    }

    pub fn is_esd(&self, name: &str) -> bool {
        self.esd_names.iter().any(|esd| esd == name)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ReconcileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ReconcileError::InvalidConfig(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ReconcileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ReconcileError::InvalidConfig(format!("{}: expected a number, got '{}'", key, value)))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
