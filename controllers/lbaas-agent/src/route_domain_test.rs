//! Unit tests for the route domain allocator

#[cfg(test)]
mod tests {
    use crate::config::AgentConfig;
    use crate::error::ReconcileError;
    use crate::route_domain::RouteDomainAllocator;
    use crate::test_utils::*;
    use device_client::{DeviceClientTrait, L2Network, MockDeviceClient, RouteDomain, SelfIp};
    use std::sync::Arc;

    fn allocator(client: &MockDeviceClient, max_namespaces_per_tenant: usize) -> RouteDomainAllocator {
        let config = AgentConfig {
            max_namespaces_per_tenant,
            ..Default::default()
        };
        RouteDomainAllocator::new(Arc::new(client.clone()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_single_namespace_mode_shares_route_domain() {
        let client = MockDeviceClient::new(&["bigip1", "bigip2"]);
        let allocator = allocator(&client, 1);

        let vlan = create_test_network("net-a", "vlan", 100);
        let vxlan = create_test_network("net-b", "vxlan", 200);
        let first = allocator
            .assign("tenant-1", &vlan, &create_test_subnet("subnet-a", "net-a", "10.0.0.0/24", None))
            .await
            .unwrap();
        let second = allocator
            .assign("tenant-1", &vxlan, &create_test_subnet("subnet-b", "net-b", "10.0.0.0/24", None))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, 0);
        for device in ["bigip1", "bigip2"] {
            let tenant_rds: Vec<RouteDomain> = client
                .route_domains(device)
                .into_iter()
                .filter(|rd| rd.partition == "Project_tenant-1")
                .collect();
            assert_eq!(tenant_rds.len(), 1);
            assert_eq!(tenant_rds[0].id, first);
        }
        assert!(client.calls("create_route_domain").is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_subnets_get_separate_route_domains() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 2);

        let rd_a = allocator
            .assign(
                "tenant-1",
                &create_test_network("net-a", "vlan", 100),
                &create_test_subnet("subnet-a", "net-a", "10.0.0.0/24", None),
            )
            .await
            .unwrap();
        let rd_b = allocator
            .assign(
                "tenant-1",
                &create_test_network("net-b", "vlan", 101),
                &create_test_subnet("subnet-b", "net-b", "10.0.0.128/25", None),
            )
            .await
            .unwrap();
        let rd_c = allocator
            .assign(
                "tenant-1",
                &create_test_network("net-c", "vlan", 102),
                &create_test_subnet("subnet-c", "net-c", "10.0.1.0/24", None),
            )
            .await
            .unwrap();

        assert_ne!(rd_a, rd_b);
        assert_eq!(rd_a, rd_c, "disjoint subnets share the first route domain");
        assert_eq!(client.calls("create_route_domain").len(), 2);
    }

    #[tokio::test]
    async fn test_pairwise_overlap_exhausts_allocation() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 2);

        for (net, seg, subnet, cidr) in [
            ("net-a", 100, "subnet-a", "10.0.0.0/24"),
            ("net-b", 101, "subnet-b", "10.0.0.0/25"),
        ] {
            allocator
                .assign(
                    "tenant-1",
                    &create_test_network(net, "vlan", seg),
                    &create_test_subnet(subnet, net, cidr, None),
                )
                .await
                .unwrap();
        }

        let result = allocator
            .assign(
                "tenant-1",
                &create_test_network("net-c", "vlan", 102),
                &create_test_subnet("subnet-c", "net-c", "10.0.0.0/26", None),
            )
            .await;
        match result {
            Err(ReconcileError::AllocationExhausted { tenant_id }) => assert_eq!(tenant_id, "tenant-1"),
            other => panic!("expected AllocationExhausted, got {:?}", other),
        }
        assert_eq!(client.calls("create_route_domain").len(), 2);
    }

    #[tokio::test]
    async fn test_known_network_reuses_cached_route_domain() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 4);
        let network = create_test_network("net-a", "vxlan", 300);

        let first = allocator
            .assign("tenant-1", &network, &create_test_subnet("subnet-a", "net-a", "10.0.0.0/24", None))
            .await
            .unwrap();
        client.reset_journal();

        // a second subnet of the same network overlaps but stays with its network
        let second = allocator
            .assign("tenant-1", &network, &create_test_subnet("subnet-a2", "net-a", "10.0.0.0/16", None))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(client.journal().is_empty());
        assert_eq!(allocator.cached_route_domain(&network).await, Some(first));
    }

    #[tokio::test]
    async fn test_hydration_reads_existing_route_domains() {
        let client = MockDeviceClient::new(&["bigip1"]);
        client.add_route_domain(
            "bigip1",
            RouteDomain {
                id: 3,
                name: "Project_tenant-1".to_string(),
                partition: "Project_tenant-1".to_string(),
                vlans: Vec::new(),
                strict: false,
            },
        );
        client.add_network(
            "bigip1",
            L2Network {
                name: "vlan-300".to_string(),
                partition: "Project_tenant-1".to_string(),
                network_type: "vlan".to_string(),
                segmentation_id: Some(300),
                route_domain_id: 3,
            },
        );
        client.add_selfip(
            "bigip1",
            SelfIp {
                name: "local-bigip1-subnet-x".to_string(),
                partition: "Project_tenant-1".to_string(),
                address: "10.5.0.2%3/24".to_string(),
                vlan: "vlan-300".to_string(),
                traffic_group: "traffic-group-local-only".to_string(),
            },
        );
        let allocator = allocator(&client, 2);

        allocator.hydrate("tenant-1").await.unwrap();
        let existing = create_test_network("net-x", "vlan", 300);
        assert_eq!(allocator.cached_route_domain(&existing).await, Some(3));

        // overlaps the hydrated self-IP subnet, so a new route domain is needed
        let placed = allocator
            .assign(
                "tenant-1",
                &create_test_network("net-y", "vlan", 400),
                &create_test_subnet("subnet-y", "net-y", "10.5.0.0/25", None),
            )
            .await
            .unwrap();
        assert_eq!(placed, 4);

        let snapshot = allocator.snapshot().await;
        assert_eq!(snapshot.route_domains("tenant-1"), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_hydration_runs_once_per_tenant() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 2);

        allocator.hydrate("tenant-1").await.unwrap();
        allocator.hydrate("tenant-1").await.unwrap();
        assert_eq!(client.calls("route_domain_ids").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_forgets_subnet() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 2);
        let network = create_test_network("net-a", "vlan", 100);

        let rd = allocator
            .assign("tenant-1", &network, &create_test_subnet("subnet-a", "net-a", "10.0.0.0/24", None))
            .await
            .unwrap();
        allocator.remove(&network, "subnet-a").await.unwrap();

        assert_eq!(allocator.cached_route_domain(&network).await, None);
        assert_eq!(allocator.snapshot().await.route_domains("tenant-1"), vec![rd]);
        let device = client.active_device().unwrap();
        assert_eq!(client.route_domain_ids(&device, "Project_tenant-1").await.unwrap(), vec![rd]);
    }

    #[tokio::test]
    async fn test_incomplete_network_is_rejected() {
        let client = MockDeviceClient::new(&["bigip1"]);
        let allocator = allocator(&client, 2);
        let mut network = create_test_network("net-a", "vlan", 100);
        network.segmentation_id = None;

        let result = allocator
            .assign("tenant-1", &network, &create_test_subnet("subnet-a", "net-a", "10.0.0.0/24", None))
            .await;
        assert!(matches!(result, Err(ReconcileError::Model(_))));
        assert!(client.journal().is_empty());
    }
}
