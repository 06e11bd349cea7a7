//! Unit tests for network attachment

#[cfg(test)]
mod tests {
    use crate::config::AgentConfig;
    use crate::error::ReconcileError;
    use crate::test_utils::*;
    use device_client::{FdbEntry, MockControlPlane, MockDeviceClient};
    use lbaas_model::{ProvisioningStatus, ServiceDefinition};

    const DEVICES: [&str; 2] = ["bigip1", "bigip2"];

    fn setup(service: &ServiceDefinition) -> (MockDeviceClient, MockControlPlane) {
        let client = MockDeviceClient::new(&DEVICES);
        let control_plane = MockControlPlane::new();
        register_service_subnets(&control_plane, service);
        (client, control_plane)
    }

    fn gateway_mode() -> AgentConfig {
        AgentConfig {
            snat_mode: false,
            snat_addresses_per_subnet: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prep_attaches_every_subnet() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        manager.prep_service_networking(&mut service).await.unwrap();

        assert_eq!(service.loadbalancer.vip_address, "10.0.0.10%1");
        assert_eq!(service.members[0].address, "10.0.1.5%1");
        assert_eq!(service.networks["net-vip"].route_domain_id, Some(1));
        assert_eq!(service.networks["net-member"].route_domain_id, Some(1));

        for device in DEVICES {
            assert_eq!(
                client.selfip_names(device),
                vec![format!("local-{}-subnet-member", device), format!("local-{}-subnet-vip", device)]
            );
            let networks: Vec<String> = client.networks(device).into_iter().map(|n| n.name).collect();
            assert!(networks.contains(&"vlan-100".to_string()));
            assert!(networks.contains(&"tunnel-vxlan-200".to_string()));
            for subnet in ["subnet-vip", "subnet-member"] {
                assert_eq!(client.snat_owners(device, "Project_tenant-1", subnet), vec!["tenant-1".to_string()]);
            }
            assert_eq!(client.route_names(device), vec!["subnet-member".to_string(), "subnet-vip".to_string()]);
            assert!(client.gateway_names(device).is_empty());
        }

        // one self-IP port per device and subnet, one SNAT port per subnet
        assert_eq!(control_plane.ports().len(), 6);
        assert_eq!(control_plane.bindings().len(), 4);
    }

    #[tokio::test]
    async fn test_prep_twice_is_a_noop() {
        let service = create_test_service();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        manager.prep_service_networking(&mut service.clone()).await.unwrap();
        client.reset_journal();
        manager.prep_service_networking(&mut service.clone()).await.unwrap();

        assert_eq!(client.mutation_count(), 0);
        assert!(client.calls("create_selfip").is_empty());
        assert!(client.calls("assure_snat_translations").is_empty());
        assert!(client.calls("create_route").is_empty());
    }

    #[tokio::test]
    async fn test_gateway_mode_claims_member_gateway() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, gateway_mode());

        manager.prep_service_networking(&mut service).await.unwrap();

        for device in DEVICES {
            assert_eq!(client.gateway_names(device), vec!["gw-subnet-member".to_string()]);
            assert!(client.snat_owners(device, "Project_tenant-1", "subnet-member").is_empty());
        }
        let gateway_port = control_plane
            .ports()
            .into_iter()
            .find(|p| p.name == "gw-subnet-member")
            .unwrap();
        assert_eq!(gateway_port.ip_address, "10.0.1.1");
    }

    #[tokio::test]
    async fn test_gateway_mode_requires_gateway_ip() {
        let mut service = create_test_service();
        service.subnets.get_mut("subnet-member").unwrap().gateway_ip = None;
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, gateway_mode());

        let result = manager.prep_service_networking(&mut service).await;
        assert!(matches!(result, Err(ReconcileError::Gateway(_))));
    }

    #[tokio::test]
    async fn test_vip_snat_mode_uses_load_balancer_owner() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let config = AgentConfig {
            snat_addresses_per_subnet: -1,
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);

        manager.prep_service_networking(&mut service).await.unwrap();

        for device in DEVICES {
            assert_eq!(client.snat_owners(device, "Project_tenant-1", "subnet-vip"), vec!["lb-1".to_string()]);
            assert!(client.snat_owners(device, "Project_tenant-1", "subnet-member").is_empty());
        }
        assert!(!control_plane.port_names().iter().any(|name| name.starts_with("snat-")));
    }

    #[tokio::test]
    async fn test_snat_shortfall_is_an_error() {
        let mut service = create_test_service();
        // five usable port addresses, two of them go to the self-IPs
        service.subnets.get_mut("subnet-member").unwrap().cidr = "10.0.1.0/29".to_string();
        let (client, control_plane) = setup(&service);
        let config = AgentConfig {
            snat_addresses_per_subnet: 8,
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);

        match manager.prep_service_networking(&mut service).await {
            Err(ReconcileError::Snat(message)) => {
                assert!(message.contains("allocate 8"));
                assert!(message.contains("Actual SNAT count: 3"));
            }
            other => panic!("expected Snat error, got {:?}", other),
        }
        assert!(client.calls("assure_snat_translations").is_empty());
    }

    #[tokio::test]
    async fn test_unbound_segment_waits_for_port_binding() {
        let mut service = create_test_service();
        service.networks.get_mut("net-member").unwrap().segmentation_id = None;
        let (client, control_plane) = setup(&service);
        let config = AgentConfig {
            network_segment_physical_network: Some("physnet1".to_string()),
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);

        let result = manager.prep_service_networking(&mut service).await;
        assert!(matches!(result, Err(ReconcileError::NetworkNotReady(_))));
        assert!(client.journal().is_empty());
    }

    #[tokio::test]
    async fn test_missing_segment_without_port_binding_is_invalid() {
        let mut service = create_test_service();
        service.networks.get_mut("net-member").unwrap().segmentation_id = None;
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        let result = manager.prep_service_networking(&mut service).await;
        assert!(matches!(result, Err(ReconcileError::Validation(_))));
        assert!(client.journal().is_empty());
    }

    #[tokio::test]
    async fn test_flat_and_common_networks_need_no_segment() {
        let mut service = create_test_service();
        let vip_network = service.networks.get_mut("net-vip").unwrap();
        vip_network.network_type = Some("flat".to_string());
        vip_network.segmentation_id = None;
        service.networks.get_mut("net-member").unwrap().segmentation_id = None;
        let (client, control_plane) = setup(&service);
        let config = AgentConfig {
            common_network_ids: vec!["net-member".to_string()],
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);

        assert!(manager.is_service_connected(&service).unwrap());
    }

    #[tokio::test]
    async fn test_global_routed_mode_skips_attachment() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let config = AgentConfig {
            global_routed_mode: true,
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);

        manager.prep_service_networking(&mut service).await.unwrap();
        assert_eq!(service.loadbalancer.vip_address, "10.0.0.10");
        assert!(client.journal().is_empty());
        assert!(control_plane.ports().is_empty());
    }

    #[tokio::test]
    async fn test_member_without_network_cannot_be_annotated() {
        let mut service = create_test_service();
        service.members[0].network_id = None;
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        let result = manager.prep_service_networking(&mut service).await;
        assert!(matches!(result, Err(ReconcileError::RouteDomain(_))));
        assert!(client.calls("assure_network").is_empty());
    }

    #[tokio::test]
    async fn test_subnets_to_assure_skips_deleting_resources() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        service.loadbalancer.provisioning_status = ProvisioningStatus::PendingDelete;
        let subnets = manager.subnets_to_assure(&service).unwrap();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].subnet.id, "subnet-member");
        assert!(subnets[0].is_for_member);

        service.members[0].provisioning_status = ProvisioningStatus::PendingDelete;
        assert!(manager.subnets_to_assure(&service).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_subnet_is_assured_once_for_members() {
        let mut service = create_test_service();
        service.members[0].subnet_id = "subnet-vip".to_string();
        service.members[0].network_id = Some("net-vip".to_string());
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        let subnets = manager.subnets_to_assure(&service).unwrap();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].subnet.id, "subnet-vip");
        assert!(subnets[0].is_for_member);
    }

    #[tokio::test]
    async fn test_update_l2_follows_member_status() {
        let mut service = create_test_service();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        manager.update_l2(&service).await;
        let expected = FdbEntry {
            tunnel: "tunnel-vxlan-200".to_string(),
            partition: "Project_tenant-1".to_string(),
            mac_address: "fa:16:3e:aa:bb:cc".to_string(),
            ip_address: "10.0.1.5".to_string(),
        };
        for device in DEVICES {
            // the VIP network is a VLAN, so only the member has an entry
            assert_eq!(client.fdb_entries(device), vec![expected.clone()]);
        }

        service.members[0].provisioning_status = ProvisioningStatus::PendingDelete;
        manager.update_l2(&service).await;
        for device in DEVICES {
            assert!(client.fdb_entries(device).is_empty());
        }
    }

    #[tokio::test]
    async fn test_update_l2_floods_tunnel_vip() {
        let mut service = create_test_service();
        service.loadbalancer.network_id = Some("net-member".to_string());
        service.loadbalancer.vip_subnet_id = "subnet-member".to_string();
        service.loadbalancer.vip_address = "10.0.1.10%1".to_string();
        service.members.clear();
        let (client, control_plane) = setup(&service);
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());

        manager.update_l2(&service).await;
        let entries = client.fdb_entries("bigip1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mac_address, "00:00:00:00:00:00");
        assert_eq!(entries[0].ip_address, "10.0.1.10");
    }
}
