//! Subnet hint bookkeeping
//!
//! Every load balancer and member status change is mirrored into the
//! per-device subnet hints. Teardown later consults them to decide which
//! subnets might be released.

use device_client::Device;
use lbaas_model::{ProvisioningStatus, SubnetDeleteCandidate, SubnetHint, SubnetHints};
use tracing::debug;

/// Updates the subnet hints of the configured devices
#[derive(Debug)]
pub struct SubnetHintTracker<'a> {
    hints: &'a mut SubnetHints,
    devices: Vec<String>,
}

impl<'a> SubnetHintTracker<'a> {
    /// Track `devices`; devices without hints yet start with empty ones
    pub fn new(hints: &'a mut SubnetHints, devices: &[Device]) -> Self {
        let devices: Vec<String> = devices.iter().map(|d| d.hostname.clone()).collect();
        for device in &devices {
            hints.entry(device.clone()).or_default();
        }
        Self { hints, devices }
    }

    /// Record a status change of a resource living on `subnet_id`
    pub fn update(&mut self, status: ProvisioningStatus, subnet_id: &str, network_id: &str, is_member: bool) {
        for device in &self.devices {
            let hint = self.hints.entry(device.clone()).or_default();
            update_hint(hint, status, subnet_id, network_id, is_member);
        }
    }

    /// Mark a subnet as in use on one device
    pub fn retain(&mut self, device: &str, subnet_id: &str) {
        let hint = self.hints.entry(device.to_string()).or_default();
        hint.check_for_delete_subnets.remove(subnet_id);
        hint.do_not_delete_subnets.insert(subnet_id.to_string());
    }

    /// Drop a teardown candidate on one device without retaining it
    pub fn forget_candidate(&mut self, device: &str, subnet_id: &str) {
        if let Some(hint) = self.hints.get_mut(device) {
            hint.check_for_delete_subnets.remove(subnet_id);
        }
    }

    /// Current teardown candidates of a device, in subnet id order
    pub fn candidates(&self, device: &str) -> Vec<SubnetDeleteCandidate> {
        self.hints
            .get(device)
            .map(|hint| hint.check_for_delete_subnets.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Apply one status change to a single device's hint.
///
/// Upserts move the subnet into `do_not_delete_subnets`; deletes record a
/// candidate unless the subnet is already retained. Other statuses are
/// ignored.
pub fn update_hint(
    hint: &mut SubnetHint,
    status: ProvisioningStatus,
    subnet_id: &str,
    network_id: &str,
    is_member: bool,
) {
    if status.is_pending_upsert() {
        hint.check_for_delete_subnets.remove(subnet_id);
        hint.do_not_delete_subnets.insert(subnet_id.to_string());
    } else if status.is_pending_delete() {
        if hint.do_not_delete_subnets.contains(subnet_id) {
            debug!("Subnet {} is retained, not a teardown candidate", subnet_id);
            return;
        }
        hint.check_for_delete_subnets.insert(
            subnet_id.to_string(),
            SubnetDeleteCandidate {
                network_id: network_id.to_string(),
                subnet_id: subnet_id.to_string(),
                is_for_member: is_member,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<Device> {
        vec![Device::new("bigip1"), Device::new("bigip2")]
    }

    #[test]
    fn test_upsert_retains_and_clears_candidate() {
        let mut hints = SubnetHints::new();
        let mut tracker = SubnetHintTracker::new(&mut hints, &devices());
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-1", "net-1", true);
        tracker.update(ProvisioningStatus::PendingCreate, "subnet-1", "net-1", true);

        for device in ["bigip1", "bigip2"] {
            let hint = &hints[device];
            assert!(hint.do_not_delete_subnets.contains("subnet-1"));
            assert!(hint.check_for_delete_subnets.is_empty());
        }
    }

    #[test]
    fn test_retained_subnet_never_becomes_candidate() {
        let mut hints = SubnetHints::new();
        let mut tracker = SubnetHintTracker::new(&mut hints, &devices());
        tracker.update(ProvisioningStatus::PendingUpdate, "subnet-1", "net-1", false);
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-1", "net-1", true);
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-1", "net-2", false);

        assert!(hints["bigip1"].check_for_delete_subnets.is_empty());
        assert!(hints["bigip2"].do_not_delete_subnets.contains("subnet-1"));
    }

    #[test]
    fn test_last_delete_wins() {
        let mut hint = SubnetHint::default();
        update_hint(&mut hint, ProvisioningStatus::PendingDelete, "subnet-1", "net-1", true);
        update_hint(&mut hint, ProvisioningStatus::PendingDelete, "subnet-1", "net-1", false);

        let candidate = &hint.check_for_delete_subnets["subnet-1"];
        assert!(!candidate.is_for_member);
        assert_eq!(candidate.network_id, "net-1");
    }

    #[test]
    fn test_active_and_error_are_noops() {
        let mut hint = SubnetHint::default();
        update_hint(&mut hint, ProvisioningStatus::Active, "subnet-1", "net-1", true);
        update_hint(&mut hint, ProvisioningStatus::Error, "subnet-1", "net-1", true);
        assert_eq!(hint, SubnetHint::default());
    }

    #[test]
    fn test_retain_moves_candidate() {
        let mut hints = SubnetHints::new();
        let mut tracker = SubnetHintTracker::new(&mut hints, &devices());
        tracker.update(ProvisioningStatus::PendingDelete, "subnet-1", "net-1", false);
        assert_eq!(tracker.candidates("bigip1").len(), 1);

        tracker.retain("bigip1", "subnet-1");
        assert!(tracker.candidates("bigip1").is_empty());
        assert_eq!(tracker.candidates("bigip2").len(), 1);
    }
}
