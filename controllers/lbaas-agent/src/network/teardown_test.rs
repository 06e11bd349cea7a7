//! Unit tests for subnet teardown

#[cfg(test)]
mod tests {
    use crate::config::AgentConfig;
    use crate::network::NetworkAttachmentManager;
    use crate::subnet_hints::SubnetHintTracker;
    use crate::test_utils::*;
    use device_client::{
        Device, DeviceClientTrait, LtmObject, MockControlPlane, MockDeviceClient, ObjectKind, SnatRequest,
    };
    use lbaas_model::{ProvisioningStatus, ServiceDefinition, SubnetHints};
    use serde_json::json;

    const DEVICES: [&str; 2] = ["bigip1", "bigip2"];
    const FOLDER: &str = "Project_tenant-1";

    struct Fixture {
        client: MockDeviceClient,
        control_plane: MockControlPlane,
        manager: NetworkAttachmentManager,
        service: ServiceDefinition,
    }

    /// Attach the test service, then mark it for deletion
    async fn attached(config: AgentConfig) -> Fixture {
        let client = MockDeviceClient::new(&DEVICES);
        let control_plane = MockControlPlane::new();
        let mut service = create_test_service();
        register_service_subnets(&control_plane, &service);
        let manager = create_test_network_manager(&client, &control_plane, config);
        manager.prep_service_networking(&mut service).await.unwrap();

        service.loadbalancer.provisioning_status = ProvisioningStatus::PendingDelete;
        for member in &mut service.members {
            member.provisioning_status = ProvisioningStatus::PendingDelete;
        }
        Fixture {
            client,
            control_plane,
            manager,
            service,
        }
    }

    fn delete_hints() -> SubnetHints {
        let mut hints = SubnetHints::new();
        let devices: Vec<Device> = DEVICES.iter().map(|d| Device::new(*d)).collect();
        let mut tracker = SubnetHintTracker::new(&mut hints, &devices);
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-vip", "net-vip", false);
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-member", "net-member", true);
        hints
    }

    #[tokio::test]
    async fn test_last_load_balancer_releases_everything() {
        let fixture = attached(AgentConfig::default()).await;
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert!(fixture.client.selfip_names(device).is_empty());
            assert!(fixture.client.networks(device).is_empty());
            assert!(fixture.client.route_names(device).is_empty());
            for subnet in ["subnet-vip", "subnet-member"] {
                assert!(fixture.client.snat_owners(device, FOLDER, subnet).is_empty());
            }
            let hint = &hints[device];
            assert!(hint.check_for_delete_subnets.is_empty());
            assert!(hint.do_not_delete_subnets.contains("subnet-vip"));
            assert!(hint.do_not_delete_subnets.contains("subnet-member"));
        }
        assert!(fixture.control_plane.ports().is_empty());
        assert!(fixture.control_plane.bindings().is_empty());

        let vip_network = &fixture.service.networks["net-vip"];
        assert_eq!(fixture.manager.route_domains().cached_route_domain(vip_network).await, None);
    }

    #[tokio::test]
    async fn test_other_load_balancer_keeps_device_objects() {
        let fixture = attached(AgentConfig::default()).await;
        fixture.control_plane.add_loadbalancer("lb-2", "net-vip", "ACTIVE");
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert_eq!(fixture.client.selfip_names(device).len(), 2);
            assert_eq!(fixture.client.route_names(device).len(), 2);
            assert!(fixture.client.snat_owners(device, FOLDER, "subnet-member").is_empty());
        }
        let ports = fixture.control_plane.port_names();
        assert_eq!(ports.len(), 4);
        assert!(!ports.iter().any(|name| name.starts_with("snat-")));
    }

    #[tokio::test]
    async fn test_subnet_with_addresses_is_kept() {
        let fixture = attached(AgentConfig::default()).await;
        for device in DEVICES {
            fixture.client.add_object(
                device,
                LtmObject::new(ObjectKind::VirtualAddress, FOLDER, "Project_lb-2").with_body(json!({"address": "10.0.0.20%1"})),
            );
        }
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert_eq!(fixture.client.selfip_names(device), vec![format!("local-{}-subnet-vip", device)]);
            assert_eq!(fixture.client.snat_owners(device, FOLDER, "subnet-vip"), vec!["tenant-1".to_string()]);
            assert!(hints[device].check_for_delete_subnets.contains_key("subnet-vip"));
        }
    }

    #[tokio::test]
    async fn test_address_in_other_route_domain_does_not_hold_subnet() {
        let fixture = attached(AgentConfig::default()).await;
        for device in DEVICES {
            fixture.client.add_object(
                device,
                LtmObject::new(ObjectKind::Member, FOLDER, "Project_member-9").with_body(json!({"address": "10.0.1.9%7"})),
            );
        }
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert!(fixture.client.selfip_names(device).is_empty());
        }
    }

    #[tokio::test]
    async fn test_snat_pool_shared_with_other_owner_is_kept() {
        let fixture = attached(AgentConfig::default()).await;
        for device in fixture.client.configured_devices() {
            let request = SnatRequest {
                partition: FOLDER.to_string(),
                subnet_id: "subnet-member".to_string(),
                owner: "tenant-2".to_string(),
                translations: Vec::new(),
                traffic_group: "traffic-group-1".to_string(),
            };
            fixture.client.assure_snat_translations(&device, &request).await.unwrap();
        }
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert_eq!(fixture.client.snat_owners(device, FOLDER, "subnet-member"), vec!["tenant-2".to_string()]);
            assert_eq!(fixture.client.selfip_names(device), vec![format!("local-{}-subnet-member", device)]);
            let hint = &hints[device];
            assert!(!hint.check_for_delete_subnets.contains_key("subnet-member"));
            assert!(!hint.do_not_delete_subnets.contains("subnet-member"));
        }
    }

    #[tokio::test]
    async fn test_gateway_mode_removes_gateway_and_its_port() {
        let config = AgentConfig {
            snat_mode: false,
            snat_addresses_per_subnet: 0,
            ..Default::default()
        };
        let fixture = attached(config).await;
        assert!(fixture.control_plane.port_names().contains(&"gw-subnet-member".to_string()));
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        for device in DEVICES {
            assert!(fixture.client.gateway_names(device).is_empty());
        }
        assert!(fixture.control_plane.ports().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_mode_leaves_routes_to_the_device_pass() {
        let config = AgentConfig {
            snat_mode: false,
            snat_addresses_per_subnet: 0,
            ..Default::default()
        };
        let fixture = attached(config).await;
        fixture.client.reset_journal();
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        // one route delete per subnet and device, none from the shared pass
        let deletes = fixture.client.calls("delete_route");
        assert_eq!(deletes.len(), 4);
        for subnet in ["subnet-vip", "subnet-member"] {
            let target = format!("/Common/{}", subnet);
            assert_eq!(deletes.iter().filter(|call| call.target == target).count(), 2);
        }
        for device in DEVICES {
            assert!(fixture.client.route_names(device).is_empty());
            assert!(fixture.client.gateway_names(device).is_empty());
        }
    }

    #[tokio::test]
    async fn test_static_arp_entries_are_purged() {
        let config = AgentConfig {
            populate_static_arp: true,
            ..Default::default()
        };
        let fixture = attached(config).await;
        fixture.client.add_arp_entry("bigip1", FOLDER, "10.0.1.77");
        fixture.client.add_arp_entry("bigip1", FOLDER, "192.168.9.9");
        let mut hints = delete_hints();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        assert_eq!(fixture.client.arp_entries("bigip1", FOLDER), vec!["192.168.9.9".to_string()]);
    }

    #[tokio::test]
    async fn test_no_candidates_touch_nothing() {
        let fixture = attached(AgentConfig::default()).await;
        fixture.client.reset_journal();
        let mut hints = SubnetHints::new();

        fixture
            .manager
            .post_service_networking(&fixture.service, &mut hints)
            .await;

        assert_eq!(fixture.client.mutation_count(), 0);
        assert_eq!(fixture.client.selfip_names("bigip1").len(), 2);
    }

    #[tokio::test]
    async fn test_global_routed_mode_leaves_hints_alone() {
        let client = MockDeviceClient::new(&DEVICES);
        let control_plane = MockControlPlane::new();
        let config = AgentConfig {
            global_routed_mode: true,
            ..Default::default()
        };
        let manager = create_test_network_manager(&client, &control_plane, config);
        let mut hints = delete_hints();
        let before = hints.clone();

        manager.post_service_networking(&create_test_service(), &mut hints).await;

        assert_eq!(hints, before);
        assert!(client.journal().is_empty());
    }

    #[tokio::test]
    async fn test_load_balancer_without_network_is_never_last() {
        let client = MockDeviceClient::new(&DEVICES);
        let control_plane = MockControlPlane::new();
        let manager = create_test_network_manager(&client, &control_plane, AgentConfig::default());
        let mut service = create_test_service();

        assert!(manager.is_last_on_network(&service).await);
        service.loadbalancer.network_id = None;
        assert!(!manager.is_last_on_network(&service).await);
    }
}
