//! Unit tests for the apply pipeline

#[cfg(test)]
mod tests {
    use crate::config::AgentConfig;
    use crate::error::ReconcileError;
    use crate::test_utils::*;
    use device_client::{FailureKind, LtmObject, ObjectKind};
    use lbaas_model::{ProvisioningStatus, ServiceDefinition, SubnetHints};
    use serde_json::json;

    const DEVICES: [&str; 2] = ["bigip1", "bigip2"];
    const FOLDER: &str = "Project_tenant-1";

    fn statuses(service: &ServiceDefinition) -> Vec<ProvisioningStatus> {
        let mut statuses = vec![service.loadbalancer.provisioning_status];
        statuses.extend(service.listeners.iter().map(|l| l.provisioning_status));
        statuses.extend(service.pools.iter().map(|p| p.provisioning_status));
        statuses.extend(service.members.iter().map(|m| m.provisioning_status));
        statuses.extend(service.healthmonitors.iter().map(|m| m.provisioning_status));
        statuses.extend(service.l7policies.iter().map(|p| p.provisioning_status));
        statuses.extend(service.l7policy_rules.iter().map(|r| r.provisioning_status));
        statuses
    }

    #[tokio::test]
    async fn test_apply_creates_every_resource() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut service = create_test_service();
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert!(statuses(&service).iter().all(|s| *s == ProvisioningStatus::Active));

        let client = &harness.device_client;
        for device in DEVICES {
            let vip = client
                .object(device, ObjectKind::VirtualAddress, FOLDER, "Project_lb-1")
                .unwrap();
            assert_eq!(vip.body["address"], "10.0.0.10%1");

            let listener = client
                .object(device, ObjectKind::Listener, FOLDER, "Project_listener-1")
                .unwrap();
            assert_eq!(listener.body["destination"], "10.0.0.10%1:80");
            assert_eq!(listener.body["pool"], "Project_pool-1");
            assert_eq!(listener.body["persistence"], json!({"type": "HTTP_COOKIE"}));

            let member = client
                .object(device, ObjectKind::Member, FOLDER, "Project_member-1")
                .unwrap();
            assert_eq!(member.body["address"], "10.0.1.5%1");
            assert_eq!(member.body["pool"], "Project_pool-1");

            assert_eq!(client.object_names(device, ObjectKind::Pool), vec!["Project_pool-1".to_string()]);
            assert_eq!(client.object_names(device, ObjectKind::Monitor), vec!["Project_monitor-1".to_string()]);

            let hint = &hints[device];
            assert!(hint.do_not_delete_subnets.contains("subnet-vip"));
            assert!(hint.do_not_delete_subnets.contains("subnet-member"));
            assert!(hint.check_for_delete_subnets.is_empty());
        }

        let vip_binding = ("subnet-vip".to_string(), "10.0.0.10".to_string());
        assert!(harness.control_plane.bindings().contains(&vip_binding));
    }

    #[tokio::test]
    async fn test_second_pass_is_a_noop() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut hints = SubnetHints::new();

        harness
            .reconciler
            .reconcile(&mut create_test_service(), &mut hints, false)
            .await
            .unwrap();
        harness.device_client.reset_journal();

        let mut service = create_test_service();
        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert_eq!(harness.device_client.mutation_count(), 0);
        assert!(statuses(&service).iter().all(|s| *s == ProvisioningStatus::Active));
    }

    #[tokio::test]
    async fn test_error_resources_are_left_alone() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut service = create_test_service();
        service.pools[0].provisioning_status = ProvisioningStatus::Error;
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Error);
        assert_eq!(service.listeners[0].provisioning_status, ProvisioningStatus::Active);
        assert_eq!(service.loadbalancer.provisioning_status, ProvisioningStatus::Active);

        let client = &harness.device_client;
        for device in DEVICES {
            assert!(client.object_names(device, ObjectKind::Pool).is_empty());

            // the listener does not point at a pool that is not on the device
            let listener = client
                .object(device, ObjectKind::Listener, FOLDER, "Project_listener-1")
                .unwrap();
            assert!(listener.body.get("pool").is_none());
            assert!(listener.body.get("persistence").is_none());
        }
        // no pool attachment was attempted on the listener
        assert!(
            client
                .calls("update_object")
                .iter()
                .all(|call| !call.target.starts_with("listener:"))
        );
    }

    #[tokio::test]
    async fn test_error_listener_does_not_fail_its_pool() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut service = create_test_service();
        service.listeners[0].provisioning_status = ProvisioningStatus::Error;
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert_eq!(service.listeners[0].provisioning_status, ProvisioningStatus::Error);
        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Active);
        assert_eq!(service.members[0].provisioning_status, ProvisioningStatus::Active);
        assert_eq!(service.loadbalancer.provisioning_status, ProvisioningStatus::Active);

        let client = &harness.device_client;
        for device in DEVICES {
            assert!(client.object_names(device, ObjectKind::Listener).is_empty());
            assert_eq!(client.object_names(device, ObjectKind::Pool), vec!["Project_pool-1".to_string()]);
        }
        assert!(
            client
                .calls("update_object")
                .iter()
                .all(|call| !call.target.starts_with("listener:"))
        );
    }

    #[tokio::test]
    async fn test_listener_being_deleted_is_not_attached() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut service = create_test_service();
        service.listeners[0].provisioning_status = ProvisioningStatus::PendingDelete;
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Active);
        assert_eq!(service.loadbalancer.provisioning_status, ProvisioningStatus::Active);
        assert!(harness.device_client.object_names("bigip1", ObjectKind::Listener).is_empty());
    }

    #[tokio::test]
    async fn test_error_load_balancer_stays_error() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        let mut service = create_test_service();
        service.loadbalancer.provisioning_status = ProvisioningStatus::Error;
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        assert_eq!(service.loadbalancer.provisioning_status, ProvisioningStatus::Error);
        assert!(
            harness
                .device_client
                .object_names("bigip1", ObjectKind::VirtualAddress)
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_pool_conflict_falls_back_to_update() {
        let harness = create_test_harness(&["bigip1"], AgentConfig::default());
        let client = &harness.device_client;
        client.add_object("bigip1", LtmObject::new(ObjectKind::Pool, FOLDER, "Project_pool-1"));
        let mut service = create_test_service();

        harness.reconciler.assure_pools_created(&mut service).await.unwrap();

        let target = format!("pool:/{}/Project_pool-1", FOLDER);
        let creates: Vec<_> = client.calls("create_object").into_iter().filter(|c| c.target == target).collect();
        let updates: Vec<_> = client.calls("update_object").into_iter().filter(|c| c.target == target).collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(updates.len(), 1);
        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Active);

        let pool = client.object("bigip1", ObjectKind::Pool, FOLDER, "Project_pool-1").unwrap();
        assert_eq!(pool.body["lb_method"], "ROUND_ROBIN");
    }

    #[tokio::test]
    async fn test_missing_object_on_update_is_created() {
        let harness = create_test_harness(&["bigip1"], AgentConfig::default());
        let mut service = create_test_service();
        service.pools[0].provisioning_status = ProvisioningStatus::PendingUpdate;

        harness.reconciler.assure_pools_created(&mut service).await.unwrap();

        let client = &harness.device_client;
        assert_eq!(client.calls("update_object").len(), 1);
        assert_eq!(client.calls("create_object").len(), 1);
        assert!(client.object("bigip1", ObjectKind::Pool, FOLDER, "Project_pool-1").is_some());
        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Active);
    }

    #[tokio::test]
    async fn test_device_failure_marks_resource_and_load_balancer() {
        let harness = create_test_harness(&DEVICES, AgentConfig::default());
        harness
            .device_client
            .fail_on("create_object", "member:", FailureKind::Api);
        let mut service = create_test_service();
        let mut hints = SubnetHints::new();

        let result = harness.reconciler.reconcile(&mut service, &mut hints, false).await;

        match result {
            Err(ReconcileError::Resource { kind, id, .. }) => {
                assert_eq!(kind, "member");
                assert_eq!(id, "member-1");
            }
            other => panic!("expected member failure, got {:?}", other),
        }
        assert_eq!(service.members[0].provisioning_status, ProvisioningStatus::Error);
        assert_eq!(service.loadbalancer.provisioning_status, ProvisioningStatus::Error);
        // earlier passes keep their outcome, later ones never ran
        assert_eq!(service.pools[0].provisioning_status, ProvisioningStatus::Active);
        let listener = harness
            .device_client
            .object("bigip1", ObjectKind::Listener, FOLDER, "Project_listener-1")
            .unwrap();
        assert!(listener.body.get("persistence").is_none());
    }

    #[tokio::test]
    async fn test_esd_policies_and_their_rules_are_skipped() {
        let config = AgentConfig {
            esd_names: vec!["esd_demo".to_string()],
            ..Default::default()
        };
        let harness = create_test_harness(&DEVICES, config);
        let mut service = create_test_service();
        service.l7policies = vec![
            create_test_l7policy("policy-1", "esd_demo", "listener-1"),
            create_test_l7policy("policy-2", "reject_api", "listener-1"),
        ];
        service.l7policy_rules = vec![
            create_test_l7rule("rule-1", "policy-1"),
            create_test_l7rule("rule-2", "policy-2"),
        ];
        let mut hints = SubnetHints::new();

        harness.reconciler.reconcile(&mut service, &mut hints, false).await.unwrap();

        let client = &harness.device_client;
        assert_eq!(client.object_names("bigip1", ObjectKind::L7Policy), vec!["Project_policy-2".to_string()]);
        assert_eq!(client.object_names("bigip1", ObjectKind::L7Rule), vec!["Project_rule-2".to_string()]);
        assert_eq!(service.l7policies[0].provisioning_status, ProvisioningStatus::PendingCreate);
        assert_eq!(service.l7policies[1].provisioning_status, ProvisioningStatus::Active);
        assert_eq!(service.l7policy_rules[0].provisioning_status, ProvisioningStatus::PendingCreate);
        assert_eq!(service.l7policy_rules[1].provisioning_status, ProvisioningStatus::Active);

        let rule = client
            .object("bigip2", ObjectKind::L7Rule, FOLDER, "Project_rule-2")
            .unwrap();
        assert_eq!(rule.body["policy"], "Project_policy-2");
        assert!(rule.body.get("key").is_none());
    }
}
