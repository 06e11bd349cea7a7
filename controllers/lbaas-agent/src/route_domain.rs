//! Route domain allocation
//!
//! Every tenant network is placed into a tenant-scoped route domain. The
//! allocator keeps a process-resident cache of which subnets live in which
//! route domain, keyed by `(tenant, route domain)`, then network short name,
//! then subnet id. Two subnets whose CIDRs overlap are never placed in the
//! same route domain.
//!
//! The cache is filled lazily per tenant from the devices (route domains in
//! the tenant folder, their VLANs and tunnels, and the self-IPs on them) and
//! pruned when teardown releases a subnet.

use crate::config::AgentConfig;
use crate::error::ReconcileError;
use device_client::{Device, DeviceClientTrait, DeviceError};
use ipnet::IpNet;
use lbaas_model::{Network, Subnet, cidrs_overlap, parse_cidr, strip_route_domain};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Cache key of one route domain of one tenant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceKey {
    pub tenant_id: String,
    pub route_domain_id: u32,
}

impl NamespaceKey {
    fn new(tenant_id: &str, route_domain_id: u32) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            route_domain_id,
        }
    }
}

/// subnet id -> CIDR
type SubnetCidrs = BTreeMap<String, IpNet>;

/// Known subnets per route domain
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteDomainCache {
    /// namespace -> network short name -> subnets
    namespaces: BTreeMap<NamespaceKey, BTreeMap<String, SubnetCidrs>>,
    hydrated_tenants: BTreeSet<String>,
}

impl RouteDomainCache {
    /// Namespace holding a network, searching every tenant
    pub fn lookup(&self, net_short_name: &str) -> Option<&NamespaceKey> {
        self.namespaces
            .iter()
            .find(|(_, networks)| networks.contains_key(net_short_name))
            .map(|(key, _)| key)
    }

    /// Route domain ids cached for a tenant, ascending
    pub fn route_domains(&self, tenant_id: &str) -> Vec<u32> {
        self.namespaces
            .keys()
            .filter(|key| key.tenant_id == tenant_id)
            .map(|key| key.route_domain_id)
            .collect()
    }

    /// Subnets recorded for a network in a namespace
    pub fn subnets(&self, key: &NamespaceKey, net_short_name: &str) -> Option<&SubnetCidrs> {
        self.namespaces.get(key).and_then(|networks| networks.get(net_short_name))
    }

    pub fn is_hydrated(&self, tenant_id: &str) -> bool {
        self.hydrated_tenants.contains(tenant_id)
    }

    fn ensure_namespace(&mut self, key: NamespaceKey) {
        self.namespaces.entry(key).or_default();
    }

    fn record(&mut self, key: NamespaceKey, net_short_name: &str, subnet_id: &str, cidr: IpNet) {
        self.namespaces
            .entry(key)
            .or_default()
            .entry(net_short_name.to_string())
            .or_default()
            .insert(subnet_id.to_string(), cidr);
    }

    /// First route domain of a tenant with no subnet overlapping `cidr`.
    ///
    /// The subnet being placed is ignored so re-placing it is stable.
    fn first_without_overlap(&self, tenant_id: &str, subnet_id: &str, cidr: &IpNet) -> Option<u32> {
        self.namespaces
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .find(|(key, networks)| {
                let overlap = networks.values().flat_map(|subnets| subnets.iter()).find(
                    |(existing_id, existing)| existing_id.as_str() != subnet_id && cidrs_overlap(cidr, existing),
                );
                if let Some((existing_id, existing)) = overlap {
                    debug!(
                        "Route domain {}: {} overlaps with subnet {} ({})",
                        key.route_domain_id, cidr, existing_id, existing
                    );
                }
                overlap.is_none()
            })
            .map(|(key, _)| key.route_domain_id)
    }

    /// Forget a subnet. Empty network entries are dropped, empty namespaces kept.
    fn remove(&mut self, net_short_name: &str, subnet_id: &str) -> bool {
        let mut removed = false;
        for networks in self.namespaces.values_mut() {
            if let Some(subnets) = networks.get_mut(net_short_name) {
                removed |= subnets.remove(subnet_id).is_some();
                if subnets.is_empty() {
                    networks.remove(net_short_name);
                }
            }
        }
        removed
    }
}

/// Assigns (tenant, network) pairs to route domains.
///
/// The cache lock is held for a whole assignment, so concurrent passes
/// cannot place two subnets from stale views of the same tenant.
pub struct RouteDomainAllocator {
    device_client: Arc<dyn DeviceClientTrait>,
    config: Arc<AgentConfig>,
    cache: Mutex<RouteDomainCache>,
}

impl RouteDomainAllocator {
    pub fn new(device_client: Arc<dyn DeviceClientTrait>, config: Arc<AgentConfig>) -> Self {
        Self {
            device_client,
            config,
            cache: Mutex::new(RouteDomainCache::default()),
        }
    }

    /// Route domain for a network's subnet, allocating one if needed
    pub async fn assign(&self, tenant_id: &str, network: &Network, subnet: &Subnet) -> Result<u32, ReconcileError> {
        let net_short_name = network.short_name()?;
        let cidr = subnet.ip_net()?;
        let mut cache = self.cache.lock().await;

        if let Some(key) = cache.lookup(&net_short_name).cloned() {
            debug!("Network {} found in route domain {} cache", net_short_name, key.route_domain_id);
            cache.record(key.clone(), &net_short_name, &subnet.id, cidr);
            return Ok(key.route_domain_id);
        }

        if self.config.max_namespaces_per_tenant == 1 {
            let route_domain_id = self.tenant_route_domain(tenant_id).await?;
            cache.record(NamespaceKey::new(tenant_id, route_domain_id), &net_short_name, &subnet.id, cidr);
            return Ok(route_domain_id);
        }

        self.hydrate_locked(&mut cache, tenant_id).await?;

        let route_domain_id = match cache.first_without_overlap(tenant_id, &subnet.id, &cidr) {
            Some(id) => id,
            None => {
                let count = cache.route_domains(tenant_id).len();
                if count >= self.config.max_namespaces_per_tenant {
                    error!(
                        "Tenant {} has {} route domains, all overlapping {}",
                        tenant_id, count, cidr
                    );
                    return Err(ReconcileError::AllocationExhausted {
                        tenant_id: tenant_id.to_string(),
                    });
                }
                let id = self.create_aux_route_domain(tenant_id).await?;
                cache.ensure_namespace(NamespaceKey::new(tenant_id, id));
                info!("Tenant {} now has {} route domains", tenant_id, count + 1);
                id
            }
        };

        debug!("Placed subnet {} ({}) in route domain {}", subnet.id, cidr, route_domain_id);
        cache.record(NamespaceKey::new(tenant_id, route_domain_id), &net_short_name, &subnet.id, cidr);
        Ok(route_domain_id)
    }

    /// Load a tenant's route domains from the devices, once per process
    pub async fn hydrate(&self, tenant_id: &str) -> Result<(), ReconcileError> {
        let mut cache = self.cache.lock().await;
        self.hydrate_locked(&mut cache, tenant_id).await
    }

    /// Forget a released subnet
    pub async fn remove(&self, network: &Network, subnet_id: &str) -> Result<(), ReconcileError> {
        let net_short_name = network.short_name()?;
        let removed = self.cache.lock().await.remove(&net_short_name, subnet_id);
        debug!("Removed subnet {} of {} from route domain cache: {}", subnet_id, net_short_name, removed);
        Ok(())
    }

    /// Cached route domain of a network, if any
    pub async fn cached_route_domain(&self, network: &Network) -> Option<u32> {
        let net_short_name = network.short_name().ok()?;
        self.cache
            .lock()
            .await
            .lookup(&net_short_name)
            .map(|key| key.route_domain_id)
    }

    /// Copy of the cache
    pub async fn snapshot(&self) -> RouteDomainCache {
        self.cache.lock().await.clone()
    }

    /// Single route domain of a tenant, looked up or created on every device
    async fn tenant_route_domain(&self, tenant_id: &str) -> Result<u32, ReconcileError> {
        let folder = self.config.folder_name(tenant_id);
        let mut route_domain_id = None;
        for device in self.device_client.all_devices() {
            let rd = self.device_client.get_route_domain(&device, &folder, &folder).await?;
            match route_domain_id {
                None => route_domain_id = Some(rd.id),
                Some(id) if id != rd.id => {
                    warn!("Device {} has route domain {} for {}, expected {}", device, rd.id, folder, id);
                }
                Some(_) => {}
            }
        }
        route_domain_id.ok_or_else(|| ReconcileError::RouteDomain("no devices to query route domains from".to_string()))
    }

    async fn create_aux_route_domain(&self, tenant_id: &str) -> Result<u32, ReconcileError> {
        let folder = self.config.folder_name(tenant_id);
        let mut route_domain_id = None;
        for device in self.device_client.all_devices() {
            let rd = self
                .device_client
                .create_route_domain(&device, &folder, self.config.route_domain_strictness, true)
                .await?;
            match route_domain_id {
                None => route_domain_id = Some(rd.id),
                Some(id) if id != rd.id => {
                    warn!("Devices allocated two different route domains: {} and {}", id, rd.id);
                }
                Some(_) => {}
            }
        }
        let id = route_domain_id
            .ok_or_else(|| ReconcileError::RouteDomain("no devices to create route domains on".to_string()))?;
        info!("Allocated route domain {} for tenant {}", id, tenant_id);
        Ok(id)
    }

    async fn hydrate_locked(&self, cache: &mut RouteDomainCache, tenant_id: &str) -> Result<(), ReconcileError> {
        if cache.is_hydrated(tenant_id) {
            return Ok(());
        }
        debug!("Route domain cache: adding tenant {}", tenant_id);
        let folder = self.config.folder_name(tenant_id);
        for device in self.device_client.all_devices() {
            for route_domain_id in self.device_client.route_domain_ids(&device, &folder).await? {
                self.hydrate_route_domain(cache, &device, tenant_id, &folder, route_domain_id)
                    .await?;
            }
        }
        cache.hydrated_tenants.insert(tenant_id.to_string());
        Ok(())
    }

    async fn hydrate_route_domain(
        &self,
        cache: &mut RouteDomainCache,
        device: &Device,
        tenant_id: &str,
        folder: &str,
        route_domain_id: u32,
    ) -> Result<(), ReconcileError> {
        let vlans = self
            .device_client
            .vlans_in_route_domain(device, folder, route_domain_id)
            .await?;
        if vlans.is_empty() {
            debug!("No vlans found for route domain {} on {}", route_domain_id, device);
            return Ok(());
        }

        let key = NamespaceKey::new(tenant_id, route_domain_id);
        cache.ensure_namespace(key.clone());

        for vlan in vlans {
            let vlan = vlan.rsplit('/').next().unwrap_or(&vlan).to_string();
            let net_short_name = match self.device_net_short_name(device, folder, &vlan).await {
                Ok(name) => name,
                Err(DeviceError::NotFound(e)) => {
                    warn!("Skipping {} in route domain {}: {}", vlan, route_domain_id, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            cache
                .namespaces
                .entry(key.clone())
                .or_default()
                .entry(net_short_name.clone())
                .or_default();

            for selfip in self.device_client.selfips(device, folder, Some(&vlan)).await? {
                let marker = format!("{}-", device.hostname);
                let Some((_, subnet_id)) = selfip.name.split_once(&marker) else {
                    error!("Found unexpected self-IP {} for tenant {}", selfip.name, tenant_id);
                    continue;
                };
                let Some((address, prefix_len)) = selfip.address.split_once('/') else {
                    warn!("Self-IP {} has no prefix length: {}", selfip.name, selfip.address);
                    continue;
                };
                let cidr = match parse_cidr(&format!("{}/{}", strip_route_domain(address), prefix_len)) {
                    Ok(cidr) => cidr,
                    Err(e) => {
                        warn!("Self-IP {}: {}", selfip.name, e);
                        continue;
                    }
                };
                debug!("Route domain cache: subnet {} is {} in {}", subnet_id, cidr, route_domain_id);
                cache.record(key.clone(), &net_short_name, subnet_id, cidr);
            }
        }
        Ok(())
    }

    /// `<type>-<key>` of a device VLAN or tunnel
    async fn device_net_short_name(&self, device: &Device, folder: &str, name: &str) -> Result<String, DeviceError> {
        if name.contains("tunnel-gre-") {
            let key = self.device_client.tunnel_key(device, folder, name).await?;
            Ok(format!("gre-{}", key))
        } else if name.contains("tunnel-vxlan-") {
            let key = self.device_client.tunnel_key(device, folder, name).await?;
            Ok(format!("vxlan-{}", key))
        } else {
            let vlan_id = self.device_client.vlan_id(device, folder, name).await?;
            Ok(format!("vlan-{}", vlan_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(cidr: &str) -> IpNet {
        parse_cidr(cidr).unwrap()
    }

    #[test]
    fn test_first_without_overlap_skips_overlapping_namespace() {
        let mut cache = RouteDomainCache::default();
        cache.record(NamespaceKey::new("t1", 1), "vxlan-10", "s1", net("10.0.0.0/24"));
        cache.record(NamespaceKey::new("t1", 2), "vxlan-20", "s2", net("192.168.0.0/24"));

        assert_eq!(cache.first_without_overlap("t1", "s3", &net("10.0.0.128/25")), Some(2));
        assert_eq!(cache.first_without_overlap("t1", "s3", &net("10.0.1.0/24")), Some(1));
        assert_eq!(cache.first_without_overlap("t2", "s3", &net("10.0.1.0/24")), None);
    }

    #[test]
    fn test_same_subnet_does_not_overlap_itself() {
        let mut cache = RouteDomainCache::default();
        cache.record(NamespaceKey::new("t1", 1), "vxlan-10", "s1", net("10.0.0.0/24"));
        assert_eq!(cache.first_without_overlap("t1", "s1", &net("10.0.0.0/24")), Some(1));
    }

    #[test]
    fn test_remove_keeps_empty_namespace() {
        let mut cache = RouteDomainCache::default();
        let key = NamespaceKey::new("t1", 1);
        cache.record(key.clone(), "vxlan-10", "s1", net("10.0.0.0/24"));

        assert!(cache.remove("vxlan-10", "s1"));
        assert!(cache.lookup("vxlan-10").is_none());
        assert_eq!(cache.route_domains("t1"), vec![1]);
        assert!(!cache.remove("vxlan-10", "s1"));
    }
}
