//! Mock DeviceClient for unit testing
//!
//! This module provides an in-memory device fleet implementing
//! [`DeviceClientTrait`], so the reconciliation engine can be tested without
//! real devices.
//!
//! The mock is organized into domain-specific modules:
//! - `ltm.rs` - LTM objects, statistics, member health, address inventory
//! - `net.rs` - route domains, VLANs/tunnels, FDB entries, self-IPs
//! - `l3.rs` - SNAT pools, gateway self-IPs, static routes, ARP entries
//! - `control_plane.rs` - [`MockControlPlane`] (ports, LB registry, L3 bindings)
//!
//! Every call is appended to a journal, and every call that changes device
//! state bumps a mutation counter. Re-applying an identical update does not
//! count as a mutation, which lets tests assert that a converged
//! reconciliation is a no-op.

mod control_plane;
mod l3;
mod ltm;
mod net;

pub use control_plane::MockControlPlane;

use crate::device_trait::DeviceClientTrait;
use crate::error::DeviceError;
use crate::models::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// `(device, kind, partition, name)`
pub(crate) type ObjectKey = (String, ObjectKind, String, String);
/// `(device, partition, name)`
pub(crate) type NamedKey = (String, String, String);

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub device: String,
    /// Trait method name, e.g. `create_object`
    pub operation: String,
    /// Operation target, e.g. `pool:/Project_t1/Project_p1`
    pub target: String,
}

/// Error to return from an injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Conflict,
    NotFound,
    Api,
    Authentication,
}

#[derive(Debug, Clone)]
pub(crate) struct FailureRule {
    device: Option<String>,
    operation: String,
    target_contains: String,
    kind: FailureKind,
}

/// Mock DeviceClient for testing
///
/// All devices share the same storage maps, keyed by device hostname.
/// Clones share state, so a test can keep a handle while the engine owns
/// an `Arc<dyn DeviceClientTrait>`.
#[derive(Clone)]
pub struct MockDeviceClient {
    pub(crate) devices: Vec<Device>,
    // In-memory device state
    pub(crate) objects: Arc<Mutex<BTreeMap<ObjectKey, LtmObject>>>,
    pub(crate) stats: Arc<Mutex<HashMap<ObjectKey, ObjectStats>>>,
    pub(crate) member_states: Arc<Mutex<HashMap<NamedKey, MemberState>>>,
    pub(crate) route_domains: Arc<Mutex<BTreeMap<(String, u32), RouteDomain>>>,
    pub(crate) networks: Arc<Mutex<BTreeMap<NamedKey, L2Network>>>,
    pub(crate) fdb: Arc<Mutex<BTreeSet<(String, FdbEntry)>>>,
    pub(crate) selfips: Arc<Mutex<BTreeMap<NamedKey, SelfIp>>>,
    /// `(device, partition, subnet)` -> owner -> translations
    pub(crate) snat_pools: Arc<Mutex<BTreeMap<NamedKey, BTreeMap<String, Vec<SnatTranslation>>>>>,
    pub(crate) gateways: Arc<Mutex<BTreeMap<NamedKey, SelfIp>>>,
    pub(crate) routes: Arc<Mutex<BTreeMap<NamedKey, Route>>>,
    pub(crate) arp_entries: Arc<Mutex<BTreeMap<(String, String), BTreeSet<String>>>>,
    // Bookkeeping
    pub(crate) journal: Arc<Mutex<Vec<JournalEntry>>>,
    pub(crate) mutations: Arc<Mutex<u64>>,
    pub(crate) failures: Arc<Mutex<Vec<FailureRule>>>,
}

impl MockDeviceClient {
    /// Create a fleet of devices; the first one is the active device.
    ///
    /// Each device starts with route domain 0 in the `Common` partition.
    pub fn new(hostnames: &[&str]) -> Self {
        let devices: Vec<Device> = hostnames.iter().map(|h| Device::new(*h)).collect();
        let mut route_domains = BTreeMap::new();
        for device in &devices {
            route_domains.insert(
                (device.hostname.clone(), 0),
                RouteDomain {
                    id: 0,
                    name: "0".to_string(),
                    partition: "Common".to_string(),
                    vlans: Vec::new(),
                    strict: false,
                },
            );
        }

        Self {
            devices,
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            stats: Arc::new(Mutex::new(HashMap::new())),
            member_states: Arc::new(Mutex::new(HashMap::new())),
            route_domains: Arc::new(Mutex::new(route_domains)),
            networks: Arc::new(Mutex::new(BTreeMap::new())),
            fdb: Arc::new(Mutex::new(BTreeSet::new())),
            selfips: Arc::new(Mutex::new(BTreeMap::new())),
            snat_pools: Arc::new(Mutex::new(BTreeMap::new())),
            gateways: Arc::new(Mutex::new(BTreeMap::new())),
            routes: Arc::new(Mutex::new(BTreeMap::new())),
            arp_entries: Arc::new(Mutex::new(BTreeMap::new())),
            journal: Arc::new(Mutex::new(Vec::new())),
            mutations: Arc::new(Mutex::new(0)),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    // Test setup

    /// Seed an LTM object without recording a mutation
    pub fn add_object(&self, device: &str, object: LtmObject) {
        let key = (device.to_string(), object.kind, object.partition.clone(), object.name.clone());
        self.objects.lock().unwrap().insert(key, object);
    }

    /// Seed counters returned by `object_stats`
    pub fn set_object_stats(&self, device: &str, kind: ObjectKind, partition: &str, name: &str, stats: ObjectStats) {
        let key = (device.to_string(), kind, partition.to_string(), name.to_string());
        self.stats.lock().unwrap().insert(key, stats);
    }

    /// Seed live member health returned by `member_state`
    pub fn set_member_state(&self, device: &str, partition: &str, name: &str, state: MemberState) {
        let key = (device.to_string(), partition.to_string(), name.to_string());
        self.member_states.lock().unwrap().insert(key, state);
    }

    /// Seed a route domain
    pub fn add_route_domain(&self, device: &str, route_domain: RouteDomain) {
        self.route_domains
            .lock()
            .unwrap()
            .insert((device.to_string(), route_domain.id), route_domain);
    }

    /// Seed an L2 segment and attach it to its route domain
    pub fn add_network(&self, device: &str, network: L2Network) {
        if let Some(rd) = self
            .route_domains
            .lock()
            .unwrap()
            .get_mut(&(device.to_string(), network.route_domain_id))
        {
            if !rd.vlans.contains(&network.name) {
                rd.vlans.push(network.name.clone());
            }
        }
        let key = (device.to_string(), network.partition.clone(), network.name.clone());
        self.networks.lock().unwrap().insert(key, network);
    }

    /// Seed a self-IP
    pub fn add_selfip(&self, device: &str, selfip: SelfIp) {
        let key = (device.to_string(), selfip.partition.clone(), selfip.name.clone());
        self.selfips.lock().unwrap().insert(key, selfip);
    }

    /// Seed a static ARP entry
    pub fn add_arp_entry(&self, device: &str, partition: &str, ip_address: &str) {
        self.arp_entries
            .lock()
            .unwrap()
            .entry((device.to_string(), partition.to_string()))
            .or_default()
            .insert(ip_address.to_string());
    }

    /// Make every matching call fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_on(&self, operation: &str, target_contains: &str, kind: FailureKind) {
        self.failures.lock().unwrap().push(FailureRule {
            device: None,
            operation: operation.to_string(),
            target_contains: target_contains.to_string(),
            kind,
        });
    }

    /// Like [`fail_on`](Self::fail_on), restricted to one device
    pub fn fail_on_device(&self, device: &str, operation: &str, target_contains: &str, kind: FailureKind) {
        self.failures.lock().unwrap().push(FailureRule {
            device: Some(device.to_string()),
            operation: operation.to_string(),
            target_contains: target_contains.to_string(),
            kind,
        });
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    // Inspection

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().unwrap().clone()
    }

    /// Journal entries for one operation, in call order
    pub fn calls(&self, operation: &str) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.operation == operation)
            .cloned()
            .collect()
    }

    /// Number of state-changing calls since creation (or the last reset)
    pub fn mutation_count(&self) -> u64 {
        *self.mutations.lock().unwrap()
    }

    /// Forget recorded calls and mutations; device state is kept
    pub fn reset_journal(&self) {
        self.journal.lock().unwrap().clear();
        *self.mutations.lock().unwrap() = 0;
    }

    pub fn object(&self, device: &str, kind: ObjectKind, partition: &str, name: &str) -> Option<LtmObject> {
        let key = (device.to_string(), kind, partition.to_string(), name.to_string());
        self.objects.lock().unwrap().get(&key).cloned()
    }

    /// Names of all objects of a kind on a device
    pub fn object_names(&self, device: &str, kind: ObjectKind) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, k, _, _)| d == device && *k == kind)
            .map(|(_, _, _, name)| name.clone())
            .collect()
    }

    pub fn route_domains(&self, device: &str) -> Vec<RouteDomain> {
        self.route_domains
            .lock()
            .unwrap()
            .iter()
            .filter(|((d, _), _)| d == device)
            .map(|(_, rd)| rd.clone())
            .collect()
    }

    pub fn networks(&self, device: &str) -> Vec<L2Network> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .filter(|((d, _, _), _)| d == device)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn selfip_names(&self, device: &str) -> Vec<String> {
        self.selfips
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, _, _)| d == device)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn fdb_entries(&self, device: &str) -> Vec<FdbEntry> {
        self.fdb
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Owners currently holding SNAT translations on a subnet
    pub fn snat_owners(&self, device: &str, partition: &str, subnet_id: &str) -> Vec<String> {
        let key = (device.to_string(), partition.to_string(), subnet_id.to_string());
        self.snat_pools
            .lock()
            .unwrap()
            .get(&key)
            .map(|owners| owners.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn gateway_names(&self, device: &str) -> Vec<String> {
        self.gateways
            .lock()
            .unwrap()
            .iter()
            .filter(|((d, _, _), _)| d == device)
            .map(|(_, gw)| gw.name.clone())
            .collect()
    }

    pub fn route_names(&self, device: &str) -> Vec<String> {
        self.routes
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, _, _)| d == device)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn arp_entries(&self, device: &str, partition: &str) -> Vec<String> {
        self.arp_entries
            .lock()
            .unwrap()
            .get(&(device.to_string(), partition.to_string()))
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    // Bookkeeping used by the domain modules

    /// Record a call and return the injected failure, if any
    pub(crate) fn record(&self, device: &Device, operation: &str, target: &str) -> Result<(), DeviceError> {
        self.journal.lock().unwrap().push(JournalEntry {
            device: device.hostname.clone(),
            operation: operation.to_string(),
            target: target.to_string(),
        });

        let failures = self.failures.lock().unwrap();
        let rule = failures.iter().find(|rule| {
            rule.operation == operation
                && target.contains(&rule.target_contains)
                && rule.device.as_ref().is_none_or(|d| *d == device.hostname)
        });
        match rule.map(|r| r.kind) {
            None => Ok(()),
            Some(FailureKind::Conflict) => Err(DeviceError::Conflict(format!("{} {} (injected)", operation, target))),
            Some(FailureKind::NotFound) => Err(DeviceError::NotFound(format!("{} {} (injected)", operation, target))),
            Some(FailureKind::Api) => Err(DeviceError::Api(format!("{} {} failed (injected)", operation, target))),
            Some(FailureKind::Authentication) => {
                Err(DeviceError::Authentication(format!("{} {} rejected (injected)", operation, target)))
            }
        }
    }

    pub(crate) fn mutated(&self) {
        *self.mutations.lock().unwrap() += 1;
    }
}

#[async_trait::async_trait]
impl DeviceClientTrait for MockDeviceClient {
    fn all_devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn configured_devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn active_device(&self) -> Option<Device> {
        self.devices.first().cloned()
    }

    async fn get_object(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<LtmObject, DeviceError> {
        ltm::get_object(self, device, kind, partition, name)
    }

    async fn create_object(&self, device: &Device, object: &LtmObject) -> Result<(), DeviceError> {
        ltm::create_object(self, device, object)
    }

    async fn update_object(&self, device: &Device, object: &LtmObject) -> Result<(), DeviceError> {
        ltm::update_object(self, device, object)
    }

    async fn delete_object(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str) -> Result<(), DeviceError> {
        ltm::delete_object(self, device, kind, partition, name)
    }

    async fn object_stats(&self, device: &Device, kind: ObjectKind, partition: &str, name: &str, keys: &[String]) -> Result<ObjectStats, DeviceError> {
        ltm::object_stats(self, device, kind, partition, name, keys)
    }

    async fn member_state(&self, device: &Device, partition: &str, name: &str) -> Result<MemberState, DeviceError> {
        ltm::member_state(self, device, partition, name)
    }

    async fn virtual_addresses(&self, device: &Device, partition: &str) -> Result<Vec<String>, DeviceError> {
        ltm::addresses_of_kind(self, device, ObjectKind::VirtualAddress, partition, "virtual_addresses")
    }

    async fn node_addresses(&self, device: &Device, partition: &str) -> Result<Vec<String>, DeviceError> {
        ltm::addresses_of_kind(self, device, ObjectKind::Member, partition, "node_addresses")
    }

    async fn get_route_domain(&self, device: &Device, partition: &str, name: &str) -> Result<RouteDomain, DeviceError> {
        net::get_route_domain(self, device, partition, name)
    }

    async fn create_route_domain(&self, device: &Device, partition: &str, strictness: bool, is_aux: bool) -> Result<RouteDomain, DeviceError> {
        net::create_route_domain(self, device, partition, strictness, is_aux)
    }

    async fn route_domain_ids(&self, device: &Device, partition: &str) -> Result<Vec<u32>, DeviceError> {
        net::route_domain_ids(self, device, partition)
    }

    async fn vlans_in_route_domain(&self, device: &Device, partition: &str, route_domain_id: u32) -> Result<Vec<String>, DeviceError> {
        net::vlans_in_route_domain(self, device, partition, route_domain_id)
    }

    async fn tunnel_key(&self, device: &Device, partition: &str, name: &str) -> Result<u32, DeviceError> {
        net::segmentation_id(self, device, partition, name, "tunnel_key")
    }

    async fn vlan_id(&self, device: &Device, partition: &str, name: &str) -> Result<u32, DeviceError> {
        net::segmentation_id(self, device, partition, name, "vlan_id")
    }

    async fn assure_network(&self, device: &Device, network: &L2Network) -> Result<(), DeviceError> {
        net::assure_network(self, device, network)
    }

    async fn delete_network(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
        net::delete_network(self, device, partition, name)
    }

    async fn add_fdb_entry(&self, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError> {
        net::add_fdb_entry(self, device, entry)
    }

    async fn delete_fdb_entry(&self, device: &Device, entry: &FdbEntry) -> Result<(), DeviceError> {
        net::delete_fdb_entry(self, device, entry)
    }

    async fn selfips(&self, device: &Device, partition: &str, vlan: Option<&str>) -> Result<Vec<SelfIp>, DeviceError> {
        net::selfips(self, device, partition, vlan)
    }

    async fn get_selfip(&self, device: &Device, partition: &str, name: &str) -> Result<SelfIp, DeviceError> {
        net::get_selfip(self, device, partition, name)
    }

    async fn create_selfip(&self, device: &Device, selfip: &SelfIp) -> Result<(), DeviceError> {
        net::create_selfip(self, device, selfip)
    }

    async fn delete_selfip(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
        net::delete_selfip(self, device, partition, name)
    }

    async fn assure_snat_translations(&self, device: &Device, request: &SnatRequest) -> Result<(), DeviceError> {
        l3::assure_snat_translations(self, device, request)
    }

    async fn release_snat_translations(&self, device: &Device, partition: &str, subnet_id: &str, owner: &str) -> Result<SnatRelease, DeviceError> {
        l3::release_snat_translations(self, device, partition, subnet_id, owner)
    }

    async fn assure_gateway(&self, device: &Device, gateway: &SelfIp) -> Result<(), DeviceError> {
        l3::assure_gateway(self, device, gateway)
    }

    async fn delete_gateway(&self, device: &Device, partition: &str, subnet_id: &str) -> Result<String, DeviceError> {
        l3::delete_gateway(self, device, partition, subnet_id)
    }

    async fn route_exists(&self, device: &Device, partition: &str, name: &str) -> Result<bool, DeviceError> {
        l3::route_exists(self, device, partition, name)
    }

    async fn create_route(&self, device: &Device, route: &Route) -> Result<(), DeviceError> {
        l3::create_route(self, device, route)
    }

    async fn delete_route(&self, device: &Device, partition: &str, name: &str) -> Result<(), DeviceError> {
        l3::delete_route(self, device, partition, name)
    }

    async fn delete_arp_entries(&self, device: &Device, partition: &str, cidr: &str) -> Result<Vec<String>, DeviceError> {
        l3::delete_arp_entries(self, device, partition, cidr)
    }
}
