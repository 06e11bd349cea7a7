//! Test utilities for unit testing the reconciliation engine
//!
//! This module provides helpers for creating service definitions and wiring
//! the engine to the in-memory device fleet and control plane.

#[cfg(test)]
use crate::config::AgentConfig;
#[cfg(test)]
use crate::network::{ControlPlane, NetworkAttachmentManager};
#[cfg(test)]
use crate::reconciler::ServiceReconciler;
#[cfg(test)]
use crate::route_domain::RouteDomainAllocator;
#[cfg(test)]
use device_client::{MockControlPlane, MockDeviceClient};
#[cfg(test)]
use lbaas_model::*;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test config with a route domain budget
#[cfg(test)]
pub fn create_test_config(max_namespaces_per_tenant: usize) -> AgentConfig {
    AgentConfig {
        max_namespaces_per_tenant,
        ..Default::default()
    }
}

/// Helper to create a test network
#[cfg(test)]
pub fn create_test_network(id: &str, network_type: &str, segmentation_id: u32) -> Network {
    Network {
        id: id.to_string(),
        network_type: Some(network_type.to_string()),
        segmentation_id: Some(segmentation_id),
        shared: false,
        route_domain_id: None,
    }
}

/// Helper to create a test subnet
#[cfg(test)]
pub fn create_test_subnet(id: &str, network_id: &str, cidr: &str, gateway_ip: Option<&str>) -> Subnet {
    Subnet {
        id: id.to_string(),
        network_id: network_id.to_string(),
        cidr: cidr.to_string(),
        gateway_ip: gateway_ip.map(|s| s.to_string()),
    }
}

/// Helper to create a test member on the member subnet
#[cfg(test)]
pub fn create_test_member(id: &str, pool_id: &str, address: &str) -> Member {
    Member {
        id: id.to_string(),
        pool_id: pool_id.to_string(),
        address: address.to_string(),
        protocol_port: 8080,
        weight: 1,
        subnet_id: "subnet-member".to_string(),
        network_id: Some("net-member".to_string()),
        port: None,
        provisioning_status: ProvisioningStatus::PendingCreate,
        operating_status: None,
    }
}

/// Helper to create an L7 policy on a listener
#[cfg(test)]
pub fn create_test_l7policy(id: &str, name: &str, listener_id: &str) -> L7Policy {
    L7Policy {
        id: id.to_string(),
        name: Some(name.to_string()),
        listener_id: listener_id.to_string(),
        action: "REJECT".to_string(),
        redirect_pool_id: None,
        redirect_url: None,
        position: 1,
        provisioning_status: ProvisioningStatus::PendingCreate,
    }
}

/// Helper to create a path match rule
#[cfg(test)]
pub fn create_test_l7rule(id: &str, policy_id: &str) -> L7Rule {
    L7Rule {
        id: id.to_string(),
        policy_id: policy_id.to_string(),
        rule_type: "PATH".to_string(),
        compare_type: "STARTS_WITH".to_string(),
        key: None,
        value: "/api".to_string(),
        invert: false,
        provisioning_status: ProvisioningStatus::PendingCreate,
    }
}

/// Helper to create a complete service definition.
///
/// One load balancer with its VIP on a VLAN network, one HTTP listener,
/// one pool with cookie persistence, one member on a VXLAN network and one
/// health monitor. Everything is `PENDING_CREATE`.
#[cfg(test)]
pub fn create_test_service() -> ServiceDefinition {
    let mut member = create_test_member("member-1", "pool-1", "10.0.1.5");
    member.port = Some(MemberPort {
        mac_address: "fa:16:3e:aa:bb:cc".to_string(),
    });

    ServiceDefinition {
        loadbalancer: LoadBalancer {
            id: "lb-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            vip_address: "10.0.0.10".to_string(),
            vip_subnet_id: "subnet-vip".to_string(),
            network_id: Some("net-vip".to_string()),
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: None,
        },
        listeners: vec![Listener {
            id: "listener-1".to_string(),
            protocol: "HTTP".to_string(),
            protocol_port: 80,
            default_pool_id: Some("pool-1".to_string()),
            connection_limit: -1,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: None,
        }],
        pools: vec![Pool {
            id: "pool-1".to_string(),
            listeners: vec![ListenerRef {
                id: "listener-1".to_string(),
            }],
            lb_algorithm: "ROUND_ROBIN".to_string(),
            session_persistence: Some(SessionPersistence {
                persistence_type: "HTTP_COOKIE".to_string(),
                cookie_name: None,
            }),
            provisioning_status: ProvisioningStatus::PendingCreate,
        }],
        members: vec![member],
        healthmonitors: vec![HealthMonitor {
            id: "monitor-1".to_string(),
            pool_id: "pool-1".to_string(),
            monitor_type: "HTTP".to_string(),
            delay: 5,
            timeout: 3,
            max_retries: 3,
            provisioning_status: ProvisioningStatus::PendingCreate,
        }],
        l7policies: Vec::new(),
        l7policy_rules: Vec::new(),
        networks: BTreeMap::from([
            ("net-vip".to_string(), create_test_network("net-vip", "vlan", 100)),
            ("net-member".to_string(), create_test_network("net-member", "vxlan", 200)),
        ]),
        subnets: BTreeMap::from([
            (
                "subnet-vip".to_string(),
                create_test_subnet("subnet-vip", "net-vip", "10.0.0.0/24", Some("10.0.0.1")),
            ),
            (
                "subnet-member".to_string(),
                create_test_subnet("subnet-member", "net-member", "10.0.1.0/24", Some("10.0.1.1")),
            ),
        ]),
    }
}

/// Make every subnet of a service available for port allocation
#[cfg(test)]
pub fn register_service_subnets(control_plane: &MockControlPlane, service: &ServiceDefinition) {
    for subnet in service.subnets.values() {
        control_plane.add_subnet(&subnet.id, &subnet.network_id, &subnet.cidr);
    }
}

/// Helper to wrap the mock control plane for the engine
#[cfg(test)]
pub fn create_test_control_plane(control_plane: &MockControlPlane) -> ControlPlane {
    ControlPlane::new(
        Arc::new(control_plane.clone()),
        Arc::new(control_plane.clone()),
        Some(Arc::new(control_plane.clone())),
    )
}

/// Helper to create a network attachment manager over the mocks
#[cfg(test)]
pub fn create_test_network_manager(
    device_client: &MockDeviceClient,
    control_plane: &MockControlPlane,
    config: AgentConfig,
) -> NetworkAttachmentManager {
    let config = Arc::new(config);
    let client: Arc<dyn device_client::DeviceClientTrait> = Arc::new(device_client.clone());
    let route_domains = Arc::new(RouteDomainAllocator::new(client.clone(), config.clone()));
    NetworkAttachmentManager::new(config, client, create_test_control_plane(control_plane), route_domains)
}

/// Mocks plus a reconciler wired to them
#[cfg(test)]
pub struct TestHarness {
    pub device_client: MockDeviceClient,
    pub control_plane: MockControlPlane,
    pub reconciler: ServiceReconciler,
}

/// Helper to create a reconciler over a fresh fleet.
///
/// The subnets of [`create_test_service`] are registered with the control
/// plane.
#[cfg(test)]
pub fn create_test_harness(hostnames: &[&str], config: AgentConfig) -> TestHarness {
    let device_client = MockDeviceClient::new(hostnames);
    let control_plane = MockControlPlane::new();
    register_service_subnets(&control_plane, &create_test_service());

    let reconciler = ServiceReconciler::new(
        Arc::new(config),
        Arc::new(device_client.clone()),
        create_test_control_plane(&control_plane),
    );

    TestHarness {
        device_client,
        control_plane,
        reconciler,
    }
}
