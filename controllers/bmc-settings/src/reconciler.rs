//! Applies `BMCSettings.spec.attributes` to the BMC manager itself,
//! under two nested holds: an exclusive `BMCMaintenance` on the BMC as a
//! whole (§3 expansion, so no other BMC- or server-scoped workflow races
//! it), and one `ServerMaintenance` per server behind it, all granted
//! before a single attribute is written (§4.7 all-or-nothing).

use std::sync::Arc;
use std::time::Duration;

use crds::maintenance::MaintenanceState;
use crds::settings::{AttributeMap, SettingsState};
use maintenance::ArbiterInput;
use redfish_client::{compare_versions, RedfishClient, VersionOrder};
use settings_diff::diff;
use tracing::info;

use crate::error::ControllerError;

/// Input to the pure arbiter for the single `BMCMaintenance` a
/// `BMCSettings` owns. Unlike `ServerMaintenance`, nothing else ever
/// contends for this object (only the `BMCSettings` that created it
/// reconciles it), so the holder is always bound to "this".
pub fn bmc_maintenance_input(policy: crds::maintenance::MaintenancePolicy, state: MaintenanceState, approved: bool, deleting: bool) -> ArbiterInput {
    ArbiterInput { policy, maintenance_state: state, approved, holder_bound_to_this: true, holder_bound_to_other: false, deleting }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPlan {
    /// Not every per-server maintenance has reached InMaintenance yet; keep waiting.
    WaitForAll,
    /// Every per-server maintenance is InMaintenance; safe to apply.
    AllGranted,
    /// A previously-possible grant was lost (deleted or failed) before the
    /// set completed; abort and release whatever was granted.
    Abort,
}

/// Decides what to do with a set of per-server `ServerMaintenance` holds
/// created for one `BMCSettings`, given their currently observed states.
/// `None` means the maintenance named at that index hasn't been observed
/// in the cache at all (not yet created, or since deleted).
pub fn evaluate_allocation(states: &[Option<MaintenanceState>]) -> AllocationPlan {
    if states.iter().all(|s| *s == Some(MaintenanceState::InMaintenance)) {
        return AllocationPlan::AllGranted;
    }
    let any_granted = states.iter().any(|s| *s == Some(MaintenanceState::InMaintenance));
    let any_lost = states.iter().any(|s| s.is_none() || *s == Some(MaintenanceState::Failed));
    if any_granted && any_lost {
        AllocationPlan::Abort
    } else {
        AllocationPlan::WaitForAll
    }
}

/// Applies one failed apply attempt against the configured retry budget
/// (§4.7 step 8). `remaining` is the previously recorded
/// `autoRetryCountRemaining`, falling back to the configured budget on
/// the first failure. `None` means the budget is exhausted and the
/// caller should go sticky-Failed.
pub fn next_retry_budget(remaining: Option<u32>, budget: u32) -> Option<u32> {
    remaining.unwrap_or(budget).checked_sub(1)
}

pub async fn reconcile(bmc_name: &str, desired: &AttributeMap, desired_version: &str, client: &Arc<dyn RedfishClient>, timeout: Duration) -> Result<SettingsState, ControllerError> {
    let device_version = client.get_bmc_version(timeout).await?;
    if compare_versions(&device_version, desired_version) != VersionOrder::Equal {
        info!(bmc = bmc_name, device_version = %device_version, desired_version = %desired_version, "bmc version does not match desired state, awaiting version upgrade");
        return Ok(SettingsState::AwaitingVersionUpgrade);
    }

    let keys: Vec<String> = desired.keys().cloned().collect();
    let current = client.get_bmc_attributes(&keys, timeout).await?;

    let result = diff(desired, &current);
    if !result.errors.is_empty() {
        let detail = result.errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        return Err(ControllerError::TypeMismatch(detail));
    }

    if result.diff.is_empty() {
        info!(bmc = bmc_name, "bmc attributes already match desired state");
        return Ok(SettingsState::Applied);
    }

    client.set_bmc_attributes_immediately(&result.diff, timeout).await?;
    Ok(SettingsState::InProgress)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crds::maintenance::MaintenancePolicy;
    use redfish_client::mock::MockRedfishClient;
    use redfish_client::types::AttributeValue;

    use super::*;

    #[test]
    fn single_owner_always_bound_to_this() {
        let input = bmc_maintenance_input(MaintenancePolicy::Enforced, MaintenanceState::Pending, false, false);
        assert!(input.holder_bound_to_this);
        assert!(!input.holder_bound_to_other);
    }

    #[test]
    fn waits_while_some_not_yet_granted() {
        let states = vec![Some(MaintenanceState::InMaintenance), Some(MaintenanceState::Pending)];
        assert_eq!(evaluate_allocation(&states), AllocationPlan::WaitForAll);
    }

    #[test]
    fn all_granted_when_every_server_in_maintenance() {
        let states = vec![Some(MaintenanceState::InMaintenance), Some(MaintenanceState::InMaintenance)];
        assert_eq!(evaluate_allocation(&states), AllocationPlan::AllGranted);
    }

    #[test]
    fn aborts_when_a_granted_hold_is_lost_before_completion() {
        let states = vec![Some(MaintenanceState::InMaintenance), None];
        assert_eq!(evaluate_allocation(&states), AllocationPlan::Abort);
    }

    #[test]
    fn no_granted_holds_yet_is_just_waiting_even_if_one_failed() {
        let states = vec![Some(MaintenanceState::Pending), Some(MaintenanceState::Failed)];
        assert_eq!(evaluate_allocation(&states), AllocationPlan::WaitForAll);
    }

    #[tokio::test]
    async fn matching_attributes_report_applied() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bmc_attributes([("NtpServer".to_string(), AttributeValue::Text("pool.ntp.org".to_string()))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let desired = AttributeMap::from([("NtpServer".to_string(), "pool.ntp.org".to_string())]);
        let state = reconcile("bmc-1", &desired, "1.0.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(state, SettingsState::Applied);
    }

    #[tokio::test]
    async fn version_mismatch_defers_attribute_diff() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bmc_attributes([("NtpServer".to_string(), AttributeValue::Text("pool.ntp.org".to_string()))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let desired = AttributeMap::from([("NtpServer".to_string(), "pool.ntp.org".to_string())]);
        let state = reconcile("bmc-1", &desired, "1.1.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(state, SettingsState::AwaitingVersionUpgrade);
    }

    #[test]
    fn retry_budget_decrements_then_exhausts() {
        let budget = 2;
        let first = next_retry_budget(None, budget);
        assert_eq!(first, Some(1));
        let second = next_retry_budget(first, budget);
        assert_eq!(second, Some(0));
        let third = next_retry_budget(second, budget);
        assert_eq!(third, None);
    }

    #[tokio::test]
    async fn differing_attribute_is_applied_immediately() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bmc_attributes([("NtpServer".to_string(), AttributeValue::Text("old.ntp.org".to_string()))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let desired = AttributeMap::from([("NtpServer".to_string(), "pool.ntp.org".to_string())]);
        let state = reconcile("bmc-1", &desired, "1.0.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(state, SettingsState::InProgress);

        let current = client.get_bmc_attributes(&["NtpServer".to_string()], Duration::from_secs(5)).await.unwrap();
        assert_eq!(current.get("NtpServer"), Some(&AttributeValue::Text("pool.ntp.org".to_string())));
    }
}
