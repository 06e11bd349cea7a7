//! Reclaiming subnets nothing uses anymore

use super::attach::{ROUTE_PARTITION, local_selfip_name};
use super::{NetworkAttachmentManager, SubnetInfo};
use crate::error::ReconcileError;
use crate::subnet_hints::SubnetHintTracker;
use device_client::{Device, DeviceError};
use lbaas_model::{ServiceDefinition, SubnetDeleteCandidate, SubnetHints, parse_address, split_route_domain, strip_route_domain};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Teardown candidates of one device, split by whether addresses still use them
#[derive(Debug, Default)]
struct CandidateSubnets {
    unused: Vec<SubnetInfo>,
    in_use: Vec<SubnetInfo>,
}

/// Treat NotFound as already done
fn tolerate_not_found(result: Result<(), DeviceError>) -> Result<(), DeviceError> {
    match result {
        Err(DeviceError::NotFound(_)) => Ok(()),
        other => other,
    }
}

impl NetworkAttachmentManager {
    /// Tear down per-subnet objects of subnets the hints marked as candidates.
    ///
    /// Shared objects (SNAT pools, gateways, routes) are released on the
    /// configured devices. Per-device objects (self-IPs, L2 networks) are
    /// only removed when this load balancer was the last one on its network.
    /// Failures are logged and the next subnet is tried.
    pub async fn post_service_networking(&self, service: &ServiceDefinition, hints: &mut SubnetHints) {
        if self.config.global_routed_mode {
            return;
        }

        self.update_l2(service).await;

        let last_on_network = self.is_last_on_network(service).await;
        let all_devices = self.device_client.all_devices();
        let mut tracker = SubnetHintTracker::new(hints, &all_devices);
        let mut deleted_names = BTreeSet::new();

        for device in self.device_client.configured_devices() {
            self.delete_shared(&device, service, &mut tracker, last_on_network, &mut deleted_names)
                .await;
        }

        if last_on_network {
            for device in &all_devices {
                self.delete_nonshared(device, service, &mut tracker, &mut deleted_names).await;
            }
        }

        for name in deleted_names {
            debug!("Deleting port {}", name);
            if let Err(e) = self.control_plane.ports.delete_port_by_name(&name).await {
                error!("Failed to delete port {}: {}", name, e);
            }
        }
    }

    /// True unless the control plane knows another load balancer on the VIP network
    pub(crate) async fn is_last_on_network(&self, service: &ServiceDefinition) -> bool {
        let loadbalancer = &service.loadbalancer;
        let Some(network_id) = loadbalancer.network_id.as_deref() else {
            return false;
        };
        match self.control_plane.loadbalancers.loadbalancers_by_network(network_id).await {
            Ok(records) => records.iter().all(|record| record.id == loadbalancer.id),
            Err(e) => {
                error!("Cannot list load balancers on network {}: {}", network_id, e);
                false
            }
        }
    }

    async fn delete_shared(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        tracker: &mut SubnetHintTracker<'_>,
        last_on_network: bool,
        deleted_names: &mut BTreeSet<String>,
    ) {
        let candidates = self
            .subnets_to_delete(device, service, &tracker.candidates(&device.hostname))
            .await;

        for info in &candidates.unused {
            match self.delete_shared_subnet(device, service, info, last_on_network).await {
                Ok((names, in_use)) => {
                    deleted_names.extend(names);
                    for subnet_id in in_use {
                        debug!("SNAT pool of subnet {} still in use on {}", subnet_id, device);
                        tracker.forget_candidate(&device.hostname, &subnet_id);
                    }
                }
                Err(e) => error!("Failed to release subnet {} on {}: {}", info.subnet.id, device, e),
            }
        }

        // the load balancer's own translations go even if its subnet stays
        if self.config.snat_addresses_per_subnet == -1 {
            for info in &candidates.in_use {
                match self.release_snats(device, service, info).await {
                    Ok((names, _)) => deleted_names.extend(names),
                    Err(e) => error!("Failed to release SNAT on subnet {} on {}: {}", info.subnet.id, device, e),
                }
            }
        }
    }

    /// Returns the deleted object names and the subnets whose SNAT pool is still in use
    async fn delete_shared_subnet(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        info: &SubnetInfo,
        last_on_network: bool,
    ) -> Result<(Vec<String>, Vec<String>), ReconcileError> {
        let (mut names, in_use) = self.release_snats(device, service, info).await?;
        let partition = self.config.network_folder(&info.network, &service.loadbalancer.tenant_id);

        if !self.config.snat_mode {
            let gateway = self.device_client.delete_gateway(device, &partition, &info.subnet.id).await?;
            names.push(gateway);
        } else if last_on_network {
            tolerate_not_found(self.device_client.delete_route(device, ROUTE_PARTITION, &info.subnet.id).await)?;
        }
        Ok((names, in_use))
    }

    async fn release_snats(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        info: &SubnetInfo,
    ) -> Result<(Vec<String>, Vec<String>), ReconcileError> {
        let loadbalancer = &service.loadbalancer;
        // (owner on the device, second half of the assured-SNAT key)
        let (owner, assured_key) = match self.config.snat_addresses_per_subnet {
            0 => return Ok((Vec::new(), Vec::new())),
            -1 => (&loadbalancer.id, loadbalancer.id.clone()),
            _ => (&loadbalancer.tenant_id, info.subnet.id.clone()),
        };
        let partition = self.config.network_folder(&info.network, &loadbalancer.tenant_id);
        let release = self
            .device_client
            .release_snat_translations(device, &partition, &info.subnet.id, owner)
            .await?;
        if self.config.snat_addresses_per_subnet == -1 || release.in_use_subnets.is_empty() {
            self.forget_snats(device, &(loadbalancer.tenant_id.clone(), assured_key)).await;
        }
        Ok((release.deleted_names, release.in_use_subnets))
    }

    async fn delete_nonshared(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        tracker: &mut SubnetHintTracker<'_>,
        deleted_names: &mut BTreeSet<String>,
    ) {
        let candidates = self
            .subnets_to_delete(device, service, &tracker.candidates(&device.hostname))
            .await;

        for info in &candidates.unused {
            match self.delete_nonshared_subnet(device, service, info).await {
                Ok(selfip_name) => {
                    info!("Released subnet {} on {}", info.subnet.id, device);
                    deleted_names.insert(selfip_name);
                    tracker.retain(&device.hostname, &info.subnet.id);
                }
                Err(e) => error!("Failed to delete network of subnet {} on {}: {}", info.subnet.id, device, e),
            }
        }
    }

    /// Remove a device's own objects on a subnet; returns the self-IP name
    async fn delete_nonshared_subnet(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        info: &SubnetInfo,
    ) -> Result<String, ReconcileError> {
        let tenant_id = &service.loadbalancer.tenant_id;
        let partition = self.config.network_folder(&info.network, tenant_id);

        if self.config.populate_static_arp {
            let purged = self
                .device_client
                .delete_arp_entries(device, &partition, &info.subnet.cidr)
                .await?;
            debug!("Purged {} static ARP entries on {}", purged.len(), device);
        }

        tolerate_not_found(self.device_client.delete_route(device, ROUTE_PARTITION, &info.subnet.id).await)?;

        let name = local_selfip_name(device, &info.subnet.id);
        let selfip = match self.device_client.get_selfip(device, &partition, &name).await {
            Ok(selfip) => Some(selfip),
            Err(DeviceError::NotFound(_)) => {
                error!("Self-IP {} not found on {}", name, device);
                None
            }
            Err(e) => return Err(e.into()),
        };
        tolerate_not_found(self.device_client.delete_selfip(device, &partition, &name).await)?;
        if let (Some(selfip), Some(l3_binding)) = (selfip, &self.control_plane.l3_binding) {
            l3_binding
                .unbind_address(&info.subnet.id, strip_route_domain(&selfip.address))
                .await?;
        }

        let l2_name = info.network.l2_name()?;
        tolerate_not_found(self.device_client.delete_network(device, &partition, &l2_name).await)?;

        self.route_domains.remove(&info.network, &info.subnet.id).await?;
        self.forget_snats(device, &(tenant_id.clone(), info.subnet.id.clone())).await;
        Ok(name)
    }

    /// Split teardown candidates by whether the devices still hold addresses on them
    async fn subnets_to_delete(
        &self,
        device: &Device,
        service: &ServiceDefinition,
        candidates: &[SubnetDeleteCandidate],
    ) -> CandidateSubnets {
        let mut subnets = CandidateSubnets::default();
        for candidate in candidates {
            let (Some(network), Some(subnet)) = (
                service.network(&candidate.network_id),
                service.subnet(&candidate.subnet_id),
            ) else {
                warn!(
                    "Subnet {} of network {} is not part of the service, cannot release it",
                    candidate.subnet_id, candidate.network_id
                );
                continue;
            };
            let info = SubnetInfo {
                network: network.clone(),
                subnet: subnet.clone(),
                is_for_member: candidate.is_for_member,
            };
            if self.ips_exist_on_subnet(device, service, &info).await {
                subnets.in_use.push(info);
            } else {
                subnets.unused.push(info);
            }
        }
        subnets
    }

    /// Any virtual address or pool node of the tenant inside the subnet.
    ///
    /// Lookup failures count as "in use".
    async fn ips_exist_on_subnet(&self, device: &Device, service: &ServiceDefinition, info: &SubnetInfo) -> bool {
        let Ok(cidr) = info.subnet.ip_net() else {
            warn!("Subnet {} has an invalid CIDR {}", info.subnet.id, info.subnet.cidr);
            return true;
        };
        let route_domain_id = info.network.route_domain_id.unwrap_or(0);
        let folder = self.config.folder_name(&service.loadbalancer.tenant_id);

        let in_subnet = |address: &String| {
            let (_, rd) = split_route_domain(address);
            rd.unwrap_or(0) == route_domain_id && parse_address(address).is_some_and(|ip| cidr.contains(&ip))
        };

        match self.device_client.virtual_addresses(device, &folder).await {
            Ok(addresses) if addresses.iter().any(in_subnet) => return true,
            Ok(_) => {}
            Err(e) => {
                error!("Cannot list virtual addresses on {}: {}", device, e);
                return true;
            }
        }
        match self.device_client.node_addresses(device, &folder).await {
            Ok(addresses) => addresses.iter().any(in_subnet),
            Err(e) => {
                error!("Cannot list pool nodes on {}: {}", device, e);
                true
            }
        }
    }
}
