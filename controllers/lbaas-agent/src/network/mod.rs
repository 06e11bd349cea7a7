//! Network attachment of load balancer services
//!
//! Before the resource passes run, every subnet the load balancer or one of
//! its members lives on is attached to the device fleet:
//! - `attach`: route domain annotation, L2 networks, self-IPs, SNAT
//!   translations, gateway self-IPs, default routes and FDB entries
//! - `teardown`: reclaiming per-subnet objects once nothing uses the subnet
//!   anymore, driven by the subnet hints

mod attach;
#[cfg(test)]
mod attach_test;
mod teardown;
#[cfg(test)]
mod teardown_test;

use crate::config::AgentConfig;
use crate::error::ReconcileError;
use crate::route_domain::RouteDomainAllocator;
use device_client::{DeviceClientTrait, L3Binding, LoadBalancerRegistry, PortProvisioner};
use lbaas_model::{Network, ServiceDefinition, Subnet};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Network types that may wait for hierarchical port binding to fill in a segment
const SEGMENTED_NETWORK_TYPES: &[&str] = &["vlan", "vxlan", "gre", "opflex"];

/// Control-plane collaborators used for attachments
#[derive(Clone)]
pub struct ControlPlane {
    pub ports: Arc<dyn PortProvisioner>,
    pub loadbalancers: Arc<dyn LoadBalancerRegistry>,
    /// Optional external L3 advertisement of VIPs and self-IPs
    pub l3_binding: Option<Arc<dyn L3Binding>>,
}

impl ControlPlane {
    pub fn new(
        ports: Arc<dyn PortProvisioner>,
        loadbalancers: Arc<dyn LoadBalancerRegistry>,
        l3_binding: Option<Arc<dyn L3Binding>>,
    ) -> Self {
        Self {
            ports,
            loadbalancers,
            l3_binding,
        }
    }
}

/// A subnet the service needs on the devices
#[derive(Debug, Clone, PartialEq)]
pub struct SubnetInfo {
    pub network: Network,
    pub subnet: Subnet,
    /// Some member lives on this subnet
    pub is_for_member: bool,
}

/// Attaches services to their networks and reclaims unused subnets
pub struct NetworkAttachmentManager {
    config: Arc<AgentConfig>,
    device_client: Arc<dyn DeviceClientTrait>,
    control_plane: ControlPlane,
    route_domains: Arc<RouteDomainAllocator>,
    /// device -> (tenant, subnet or load balancer id) with SNAT translations in place
    assured_snats: Mutex<BTreeMap<String, BTreeSet<(String, String)>>>,
}

impl NetworkAttachmentManager {
    pub fn new(
        config: Arc<AgentConfig>,
        device_client: Arc<dyn DeviceClientTrait>,
        control_plane: ControlPlane,
        route_domains: Arc<RouteDomainAllocator>,
    ) -> Self {
        Self {
            config,
            device_client,
            control_plane,
            route_domains,
            assured_snats: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn route_domains(&self) -> &Arc<RouteDomainAllocator> {
        &self.route_domains
    }

    /// True when every network of the service has its segment bound.
    ///
    /// Common and flat networks need no segment. A missing segment on a
    /// segmented network type is only "not ready yet" when hierarchical port
    /// binding is configured; otherwise the definition is invalid.
    pub fn is_service_connected(&self, service: &ServiceDefinition) -> Result<bool, ReconcileError> {
        for (network_id, network) in &service.networks {
            if self.config.common_network_ids.iter().any(|id| id == network_id) {
                continue;
            }
            let network_type = network.network_type.as_deref().unwrap_or("");
            if network_type == "flat" {
                continue;
            }
            if network.segmentation_id.is_some_and(|id| id != 0) {
                continue;
            }
            if SEGMENTED_NETWORK_TYPES.contains(&network_type)
                && self.config.network_segment_physical_network.is_some()
            {
                debug!("Network {} has no segment bound yet", network_id);
                return Ok(false);
            }
            error!(
                "Segmentation id is missing for network {}; check network_segment_physical_network \
                 when running with hierarchical port binding",
                network_id
            );
            return Err(ReconcileError::Validation(format!(
                "Network segment ID {} not defined",
                network_id
            )));
        }
        Ok(true)
    }

    /// Validate, annotate and attach a service before its resources are applied
    pub async fn prep_service_networking(&self, service: &mut ServiceDefinition) -> Result<(), ReconcileError> {
        if self.config.global_routed_mode {
            return Ok(());
        }

        if !self.is_service_connected(service)? {
            return Err(ReconcileError::NetworkNotReady(
                "Network segment(s) definition incomplete".to_string(),
            ));
        }

        if self.config.use_namespaces {
            debug!("Annotating the service definition networks with route domain ID");
            self.annotate_route_domains(service).await?;
        }

        let subnets = self.subnets_to_assure(service)?;
        let tenant_id = service.loadbalancer.tenant_id.clone();

        for device in self.device_client.all_devices() {
            for info in &subnets {
                debug!("Assuring network connectivity of {} on subnet {}", device, info.subnet.id);
                self.assure_device_network(&device, info, &tenant_id).await?;
                self.assure_selfip(&device, info, &tenant_id).await?;
            }
        }

        let devices = self.device_client.configured_devices();
        for info in &subnets {
            if self.config.snat_addresses_per_subnet > 0 {
                self.assure_subnet_snats(&devices, service, info).await?;
            } else if self.config.snat_addresses_per_subnet == -1
                && info.subnet.id == service.loadbalancer.vip_subnet_id
            {
                self.assure_lb_snats(&devices, service, info).await?;
            }

            if info.is_for_member && !self.config.snat_mode {
                self.allocate_gateway_address(info).await?;
                for device in &devices {
                    self.assure_gateway(device, info, &tenant_id).await?;
                }
            }
        }

        self.assure_subnet_routes(service).await;
        Ok(())
    }
}
