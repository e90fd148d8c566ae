//! §8 scenario coverage for the BMC-scoped settings reconciler: the
//! multi-hold fan-out modeled through the pure arbiter and allocation
//! planner, then the attribute apply and retry budget against
//! `MockRedfishClient`, standing in for the object store a live cluster
//! would otherwise provide.

use std::sync::Arc;
use std::time::Duration;

use crds::maintenance::{MaintenancePolicy, MaintenanceState};
use crds::settings::{AttributeMap, SettingsState};
use maintenance::decide;
use redfish_client::mock::MockRedfishClient;
use redfish_client::types::AttributeValue;
use redfish_client::RedfishClient;

use crate::reconciler::{self, AllocationPlan};

/// Scenario 5: a BMCSettings diff that needs applying waits for every
/// per-server hold to be granted before touching a single attribute,
/// then reaches Applied once they are.
#[tokio::test]
async fn diff_applies_once_every_hold_is_granted() {
    let bmc_hold = reconciler::bmc_maintenance_input(MaintenancePolicy::Enforced, MaintenanceState::Pending, false, false);
    assert_eq!(decide(bmc_hold), maintenance::ArbiterAction::Grant);

    // Neither per-server hold has been observed yet: wait.
    assert_eq!(reconciler::evaluate_allocation(&[None, None]), AllocationPlan::WaitForAll);
    // One observed but still Pending: still wait.
    assert_eq!(reconciler::evaluate_allocation(&[Some(MaintenanceState::Pending), None]), AllocationPlan::WaitForAll);
    // Both granted: safe to apply.
    assert_eq!(reconciler::evaluate_allocation(&[Some(MaintenanceState::InMaintenance), Some(MaintenanceState::InMaintenance)]), AllocationPlan::AllGranted);

    let mock = MockRedfishClient::new("1.0.0", "2.1.0");
    mock.seed_bmc_attributes([("NtpServer".to_string(), AttributeValue::Text("old.ntp.org".to_string()))].into_iter().collect());
    let client: Arc<dyn RedfishClient> = Arc::new(mock);

    let desired: AttributeMap = [("NtpServer".to_string(), "pool.ntp.org".to_string())].into_iter().collect();

    let state = reconciler::reconcile("bmc-1", &desired, "1.0.0", &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(state, SettingsState::InProgress);

    let state = reconciler::reconcile("bmc-1", &desired, "1.0.0", &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(state, SettingsState::Applied);
}

/// Scenario 5 continued: a granted hold withdrawn before the set
/// completes aborts the whole apply rather than applying partially.
#[test]
fn withdrawn_hold_before_completion_aborts() {
    assert_eq!(reconciler::evaluate_allocation(&[Some(MaintenanceState::InMaintenance), None]), AllocationPlan::Abort);
    assert_eq!(reconciler::evaluate_allocation(&[Some(MaintenanceState::InMaintenance), Some(MaintenanceState::Failed)]), AllocationPlan::Abort);
}

/// Scenario 6: a known-bad attribute key keeps failing the apply; the
/// retry budget decrements 2 -> 1 -> 0, then the object goes sticky
/// Failed until an operator retries it.
#[tokio::test]
async fn bad_attribute_key_exhausts_the_retry_budget_then_fails() {
    let mock = MockRedfishClient::new("1.0.0", "2.1.0");
    mock.seed_bmc_attributes([("MaxTemp".to_string(), AttributeValue::Integer(80))].into_iter().collect());
    let client: Arc<dyn RedfishClient> = Arc::new(mock);

    let desired: AttributeMap = [("MaxTemp".to_string(), "too-hot".to_string())].into_iter().collect();
    let budget = 2;
    let mut remaining = None;

    for expected in [Some(1), Some(0), None] {
        let err = reconciler::reconcile("bmc-1", &desired, "1.0.0", &client, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, crate::error::ControllerError::TypeMismatch(_)));
        assert_eq!(err.classify(), crate::error::ErrorClass::ObjectFailure);

        remaining = reconciler::next_retry_budget(remaining, budget);
        assert_eq!(remaining, expected);
    }

    assert_eq!(remaining, None, "budget exhausted, caller goes sticky Failed");
}
