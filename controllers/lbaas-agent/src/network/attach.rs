//! Apply-side network attachment

use super::{NetworkAttachmentManager, SubnetInfo};
use crate::error::ReconcileError;
use device_client::{
    Device, DeviceError, FdbEntry, L2Network, Port, Route, SelfIp, SnatRequest, SnatTranslation, gateway_name,
};
use lbaas_model::{
    ModelError, ProvisioningStatus, ServiceDefinition, Subnet, strip_route_domain, with_route_domain,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Traffic group of per-device self-IPs
const LOCAL_TRAFFIC_GROUP: &str = "traffic-group-local-only";
/// MAC of the flooding FDB record of a tunnel
const FLOOD_MAC: &str = "00:00:00:00:00:00";

/// Partition static routes live in
pub(super) const ROUTE_PARTITION: &str = "Common";

/// Name of a device's self-IP (and its port) on a subnet
pub(super) fn local_selfip_name(device: &Device, subnet_id: &str) -> String {
    format!("local-{}-{}", device.hostname, subnet_id)
}

fn is_tunnel(network_type: Option<&str>) -> bool {
    matches!(network_type, Some("vxlan") | Some("gre"))
}

fn missing(kind: &'static str, id: &str) -> ReconcileError {
    ModelError::MissingReference {
        kind,
        id: id.to_string(),
    }
    .into()
}

impl NetworkAttachmentManager {
    /// Place the VIP and member networks into route domains and suffix their addresses
    pub(crate) async fn annotate_route_domains(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        let tenant_id = service.loadbalancer.tenant_id.clone();

        for i in 0..service.members.len() {
            let member = &service.members[i];
            if member.address.is_empty() {
                continue;
            }
            debug!("Processing member {}", member.address);
            let Some(network_id) = member.network_id.clone().filter(|id| !id.is_empty()) else {
                return Err(ReconcileError::RouteDomain(format!(
                    "global routing disabled but no network id given for member {}",
                    member.id
                )));
            };
            let subnet_id = member.subnet_id.clone();
            let route_domain_id = self.place_network(service, &tenant_id, &network_id, &subnet_id).await?;
            let member = &mut service.members[i];
            if route_domain_id == 0 {
                return Err(ReconcileError::RouteDomain(format!(
                    "global routing disabled but route domain 0 was found for member {}",
                    member.id
                )));
            }
            member.address = with_route_domain(&member.address, route_domain_id);
        }

        if service.loadbalancer.vip_address.is_empty() {
            return Ok(());
        }
        let Some(network_id) = service.loadbalancer.network_id.clone().filter(|id| !id.is_empty()) else {
            return Err(ReconcileError::RouteDomain(format!(
                "global routing disabled but no network id given for the VIP of {}",
                service.loadbalancer.id
            )));
        };
        let subnet_id = service.loadbalancer.vip_subnet_id.clone();
        let route_domain_id = self.place_network(service, &tenant_id, &network_id, &subnet_id).await?;
        if route_domain_id == 0 {
            return Err(ReconcileError::RouteDomain(format!(
                "global routing disabled but route domain 0 was found for the VIP of {}",
                service.loadbalancer.id
            )));
        }
        let loadbalancer = &mut service.loadbalancer;
        loadbalancer.vip_address = with_route_domain(&loadbalancer.vip_address, route_domain_id);
        Ok(())
    }

    /// Assign a route domain to a network of the service and record it on the network
    async fn place_network(
        &self,
        service: &mut ServiceDefinition,
        tenant_id: &str,
        network_id: &str,
        subnet_id: &str,
    ) -> Result<u32, ReconcileError> {
        let network = service.network(network_id).cloned().ok_or_else(|| {
            ReconcileError::RouteDomain(format!("global routing disabled but network {} is not in the service", network_id))
        })?;
        let subnet = service.subnet(subnet_id).cloned().ok_or_else(|| missing("subnet", subnet_id))?;

        let route_domain_id = self.route_domains.assign(tenant_id, &network, &subnet).await?;
        if let Some(network) = service.networks.get_mut(network_id) {
            network.route_domain_id = Some(route_domain_id);
        }
        Ok(route_domain_id)
    }

    /// Distinct (network, subnet) pairs used by the VIP and the non-deleting members
    pub(crate) fn subnets_to_assure(&self, service: &ServiceDefinition) -> Result<Vec<SubnetInfo>, ReconcileError> {
        let mut subnets: BTreeMap<(String, String), SubnetInfo> = BTreeMap::new();
        let loadbalancer = &service.loadbalancer;

        if !loadbalancer.provisioning_status.is_pending_delete() {
            if let Some(network_id) = &loadbalancer.network_id {
                let info = self.subnet_info(service, network_id, &loadbalancer.vip_subnet_id, false)?;
                subnets.insert((network_id.clone(), loadbalancer.vip_subnet_id.clone()), info);
            }
        }

        for member in &service.members {
            if member.provisioning_status.is_pending_delete() {
                continue;
            }
            let Some(network_id) = &member.network_id else {
                continue;
            };
            let key = (network_id.clone(), member.subnet_id.clone());
            match subnets.get_mut(&key) {
                Some(info) => info.is_for_member = true,
                None => {
                    let info = self.subnet_info(service, network_id, &member.subnet_id, true)?;
                    subnets.insert(key, info);
                }
            }
        }
        Ok(subnets.into_values().collect())
    }

    fn subnet_info(
        &self,
        service: &ServiceDefinition,
        network_id: &str,
        subnet_id: &str,
        is_for_member: bool,
    ) -> Result<SubnetInfo, ReconcileError> {
        Ok(SubnetInfo {
            network: service.network(network_id).cloned().ok_or_else(|| missing("network", network_id))?,
            subnet: service.subnet(subnet_id).cloned().ok_or_else(|| missing("subnet", subnet_id))?,
            is_for_member,
        })
    }

    pub(crate) async fn assure_device_network(
        &self,
        device: &Device,
        info: &SubnetInfo,
        tenant_id: &str,
    ) -> Result<(), ReconcileError> {
        let network = &info.network;
        let l2 = L2Network {
            name: network.l2_name()?,
            partition: self.config.network_folder(network, tenant_id),
            network_type: network.network_type.clone().unwrap_or_default(),
            segmentation_id: network.segmentation_id,
            route_domain_id: network.route_domain_id.unwrap_or(0),
        };
        self.device_client.assure_network(device, &l2).await?;
        Ok(())
    }

    /// Give a device its own address on the subnet
    pub(crate) async fn assure_selfip(&self, device: &Device, info: &SubnetInfo, tenant_id: &str) -> Result<(), ReconcileError> {
        let name = local_selfip_name(device, &info.subnet.id);
        let partition = self.config.network_folder(&info.network, tenant_id);

        match self.device_client.get_selfip(device, &partition, &name).await {
            Ok(_) => return Ok(()),
            Err(DeviceError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let port = self.port_for(&info.subnet, &name, None).await?;
        let selfip = SelfIp {
            name: name.clone(),
            partition,
            address: self.device_address(&port.ip_address, info)?,
            vlan: info.network.l2_name()?,
            traffic_group: LOCAL_TRAFFIC_GROUP.to_string(),
        };
        match self.device_client.create_selfip(device, &selfip).await {
            Ok(()) => info!("Created self-IP {} ({}) on {}", name, selfip.address, device),
            Err(DeviceError::Conflict(_)) => debug!("Self-IP {} already exists on {}", name, device),
            Err(e) => return Err(e.into()),
        }

        if let Some(l3_binding) = &self.control_plane.l3_binding {
            l3_binding.bind_address(&info.subnet.id, &port.ip_address).await?;
        }
        Ok(())
    }

    /// Per-subnet SNAT pool owned by the tenant
    pub(crate) async fn assure_subnet_snats(
        &self,
        devices: &[Device],
        service: &ServiceDefinition,
        info: &SubnetInfo,
    ) -> Result<(), ReconcileError> {
        let tenant_id = &service.loadbalancer.tenant_id;
        let key = (tenant_id.clone(), info.subnet.id.clone());
        let devices = self.unassured_snat_devices(devices, &key).await;
        if devices.is_empty() {
            return Ok(());
        }

        debug!("Getting SNAT addresses for subnet {}", info.subnet.id);
        let wanted = usize::try_from(self.config.snat_addresses_per_subnet).unwrap_or(0);
        let mut translations = Vec::with_capacity(wanted);
        for index in 0..wanted {
            let name = format!("snat-{}-{}", info.subnet.id, index);
            match self.port_for(&info.subnet, &name, None).await {
                Ok(port) => translations.push(SnatTranslation {
                    address: self.route_domain_address(&port.ip_address, info),
                    name,
                }),
                Err(e) => {
                    warn!("Cannot allocate SNAT port {}: {}", name, e);
                    break;
                }
            }
        }
        if translations.len() != wanted {
            return Err(ReconcileError::Snat(format!(
                "Unable to satisfy request to allocate {} SNATs. Actual SNAT count: {}",
                wanted,
                translations.len()
            )));
        }

        let request = SnatRequest {
            partition: self.config.network_folder(&info.network, tenant_id),
            subnet_id: info.subnet.id.clone(),
            owner: tenant_id.clone(),
            translations,
            traffic_group: self.config.traffic_group.clone(),
        };
        self.assure_snats_on(&devices, &request, key).await
    }

    /// Single SNAT address per load balancer, reusing the VIP
    pub(crate) async fn assure_lb_snats(
        &self,
        devices: &[Device],
        service: &ServiceDefinition,
        info: &SubnetInfo,
    ) -> Result<(), ReconcileError> {
        let loadbalancer = &service.loadbalancer;
        let key = (loadbalancer.tenant_id.clone(), loadbalancer.id.clone());
        let devices = self.unassured_snat_devices(devices, &key).await;
        if devices.is_empty() {
            return Ok(());
        }

        debug!("Reusing the VIP as SNAT address of {}", loadbalancer.id);
        let address = strip_route_domain(&loadbalancer.vip_address);
        let request = SnatRequest {
            partition: self.config.network_folder(&info.network, &loadbalancer.tenant_id),
            subnet_id: info.subnet.id.clone(),
            owner: loadbalancer.id.clone(),
            translations: vec![SnatTranslation {
                name: format!("snat-{}", loadbalancer.id),
                address: self.route_domain_address(address, info),
            }],
            traffic_group: self.config.traffic_group.clone(),
        };
        self.assure_snats_on(&devices, &request, key).await
    }

    async fn unassured_snat_devices(&self, devices: &[Device], key: &(String, String)) -> Vec<Device> {
        let assured = self.assured_snats.lock().await;
        devices
            .iter()
            .filter(|device| !assured.get(&device.hostname).is_some_and(|keys| keys.contains(key)))
            .cloned()
            .collect()
    }

    async fn assure_snats_on(
        &self,
        devices: &[Device],
        request: &SnatRequest,
        key: (String, String),
    ) -> Result<(), ReconcileError> {
        for device in devices {
            self.device_client.assure_snat_translations(device, request).await?;
            self.assured_snats
                .lock()
                .await
                .entry(device.hostname.clone())
                .or_default()
                .insert(key.clone());
        }
        Ok(())
    }

    /// Forget that a device has SNAT translations for a key
    pub(crate) async fn forget_snats(&self, device: &Device, key: &(String, String)) {
        if let Some(keys) = self.assured_snats.lock().await.get_mut(&device.hostname) {
            keys.remove(key);
        }
    }

    /// Claim the subnet's gateway address in the control plane.
    ///
    /// A subnet without gateway address is an error; failing to get the
    /// port is only logged, the gateway will not answer for that subnet.
    pub(crate) async fn allocate_gateway_address(&self, info: &SubnetInfo) -> Result<(), ReconcileError> {
        let subnet = &info.subnet;
        let Some(gateway_ip) = subnet.gateway_ip.as_deref() else {
            return Err(ReconcileError::Gateway(format!(
                "attempting to create gateway on subnet {} without gateway ip address specified",
                subnet.id
            )));
        };

        let name = gateway_name(&subnet.id);
        match self.control_plane.ports.get_port_by_name(&name).await {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(e) => {
                error!("Cannot look up gateway port {}: {}", name, e);
                return Ok(());
            }
        }

        match self
            .control_plane
            .ports
            .create_port_on_subnet(&subnet.id, &name, Some(gateway_ip))
            .await
        {
            Ok(port) => info!("Gateway IP for subnet {} will be port {}", subnet.id, port.id),
            Err(e) => error!(
                "Invalid default gateway for subnet {}:{} - {}. SNAT will not function and load balancing will likely fail. Enable SNAT mode.",
                subnet.id, gateway_ip, e
            ),
        }
        Ok(())
    }

    /// Let a device answer as the subnet's default gateway
    pub(crate) async fn assure_gateway(&self, device: &Device, info: &SubnetInfo, tenant_id: &str) -> Result<(), ReconcileError> {
        let gateway_ip = info.subnet.gateway_ip.as_deref().unwrap_or_default();
        let gateway = SelfIp {
            name: gateway_name(&info.subnet.id),
            partition: self.config.network_folder(&info.network, tenant_id),
            address: self.device_address(gateway_ip, info)?,
            vlan: info.network.l2_name()?,
            traffic_group: self.config.traffic_group.clone(),
        };
        self.device_client.assure_gateway(device, &gateway).await?;
        Ok(())
    }

    /// Default route per subnet in the load balancer network's route domain.
    ///
    /// Failures are logged only.
    pub(crate) async fn assure_subnet_routes(&self, service: &ServiceDefinition) {
        let route_domain_id = service
            .loadbalancer
            .network_id
            .as_deref()
            .and_then(|id| service.network(id))
            .and_then(|network| network.route_domain_id)
            .unwrap_or(0);

        for device in self.device_client.all_devices() {
            for (subnet_id, subnet) in &service.subnets {
                let Some(gateway_ip) = subnet.gateway_ip.as_deref() else {
                    debug!("Subnet {} has no gateway, no default route", subnet_id);
                    continue;
                };
                match self.device_client.route_exists(&device, ROUTE_PARTITION, subnet_id).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        error!("Cannot look up default route of subnet {} on {}: {}", subnet_id, device, e);
                        continue;
                    }
                }
                let route = Route {
                    name: subnet_id.clone(),
                    partition: ROUTE_PARTITION.to_string(),
                    destination: format!("default%{}", route_domain_id),
                    gateway: format!("{}%{}", gateway_ip, route_domain_id),
                };
                if let Err(e) = self.device_client.create_route(&device, &route).await {
                    error!(
                        "Failed to create default gateway route for network {} subnet {}: {}",
                        subnet.network_id, subnet_id, e
                    );
                }
            }
        }
    }

    /// Add or remove the FDB records of members and the VIP on tunnel networks.
    ///
    /// Failures are logged only.
    pub(crate) async fn update_l2(&self, service: &ServiceDefinition) {
        let loadbalancer = &service.loadbalancer;
        for device in self.device_client.all_devices() {
            for member in &service.members {
                let Some(network) = member.network_id.as_deref().and_then(|id| service.network(id)) else {
                    continue;
                };
                let delete = member.provisioning_status.is_pending_delete();
                let Some(port) = &member.port else {
                    if delete {
                        warn!(
                            "Member {} has no port; FDB entries created for it may need manual removal",
                            member.address
                        );
                    } else {
                        info!("Member {} has no port, no FDB entries are created for it", member.address);
                    }
                    continue;
                };
                if !is_tunnel(network.network_type.as_deref()) {
                    continue;
                }
                let Ok(tunnel) = network.l2_name() else {
                    continue;
                };
                let entry = FdbEntry {
                    tunnel,
                    partition: self.config.network_folder(network, &loadbalancer.tenant_id),
                    mac_address: port.mac_address.clone(),
                    ip_address: strip_route_domain(&member.address).to_string(),
                };
                self.apply_fdb(&device, &entry, delete).await;
            }

            let Some(network_id) = loadbalancer.network_id.as_deref() else {
                error!("Load balancer {} has no network id, skipping VIP FDB", loadbalancer.id);
                continue;
            };
            let Some(network) = service.network(network_id) else {
                continue;
            };
            if !is_tunnel(network.network_type.as_deref()) {
                continue;
            }
            let Ok(tunnel) = network.l2_name() else {
                continue;
            };
            let entry = FdbEntry {
                tunnel,
                partition: self.config.network_folder(network, &loadbalancer.tenant_id),
                mac_address: FLOOD_MAC.to_string(),
                ip_address: strip_route_domain(&loadbalancer.vip_address).to_string(),
            };
            let delete = loadbalancer.provisioning_status == ProvisioningStatus::PendingDelete;
            self.apply_fdb(&device, &entry, delete).await;
        }
    }

    async fn apply_fdb(&self, device: &Device, entry: &FdbEntry, delete: bool) {
        let result = if delete {
            self.device_client.delete_fdb_entry(device, entry).await
        } else {
            self.device_client.add_fdb_entry(device, entry).await
        };
        if let Err(e) = result {
            warn!("FDB update of {} on {} failed: {}", entry.ip_address, device, e);
        }
    }

    /// Existing port with this name, or a new one on the subnet
    async fn port_for(&self, subnet: &Subnet, name: &str, fixed_ip: Option<&str>) -> Result<Port, DeviceError> {
        if let Some(port) = self.control_plane.ports.get_port_by_name(name).await? {
            return Ok(port);
        }
        self.control_plane.ports.create_port_on_subnet(&subnet.id, name, fixed_ip).await
    }

    /// `address%rd` in the network's route domain
    fn route_domain_address(&self, address: &str, info: &SubnetInfo) -> String {
        with_route_domain(address, info.network.route_domain_id.unwrap_or(0))
    }

    /// `address%rd/prefix` as used by self-IPs
    fn device_address(&self, address: &str, info: &SubnetInfo) -> Result<String, ReconcileError> {
        let prefix_len = info.subnet.ip_net()?.prefix_len();
        Ok(format!("{}/{}", self.route_domain_address(address, info), prefix_len))
    }
}
