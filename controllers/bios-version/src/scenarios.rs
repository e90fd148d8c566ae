//! §8 scenario coverage: drives the checkpoint sequence and the version
//! precheck against `MockRedfishClient`, with the maintenance grant
//! modeled through the same pure arbiter the `server-maintenance`
//! controller drives, standing in for the object store a live cluster
//! would otherwise provide.

use std::sync::Arc;
use std::time::Duration;

use crds::bios_version::{
    BiosVersionState, BiosVersionStatus, CONDITION_REBOOT_POWER_OFF, CONDITION_REBOOT_POWER_ON, CONDITION_UPGRADE_COMPLETED, CONDITION_UPGRADE_ISSUED, CONDITION_VERIFICATION_COMPLETED,
};
use crds::firmware_image::{FirmwareImage, FirmwareModule};
use crds::maintenance::{MaintenancePolicy, MaintenanceState};
use crds::references::ClusterRef;
use crds::server::{Server, ServerSpec};
use maintenance::{decide, ArbiterAction, ArbiterInput};
use redfish_client::mock::MockRedfishClient;
use redfish_client::types::PowerState;
use redfish_client::{system_uri, RedfishClient};

use crate::reconciler;

fn server() -> Server {
    Server::new(
        "srv-1",
        ServerSpec { bmc_ref: ClusterRef::new("bmc-1"), bmc_index: 0, claim_ref: None, maintenance_ref: None, bios_settings_ref: None, boot_configuration_ref: None, power: None },
    )
}

fn image(version: &str) -> FirmwareImage {
    FirmwareImage { updated_version: version.to_string(), resource_uri: format!("https://images/{version}.bin"), module: FirmwareModule::Bios }
}

fn unbound_input(policy: MaintenancePolicy, approved: bool) -> ArbiterInput {
    ArbiterInput { policy, maintenance_state: MaintenanceState::Pending, approved, holder_bound_to_this: false, holder_bound_to_other: false, deleting: false }
}

/// Scenario 1: device already at the desired version never creates a
/// maintenance or issues a task; it reaches Completed on the spot.
#[tokio::test]
async fn already_matching_version_completes_without_a_task() {
    let client: Arc<dyn RedfishClient> = Arc::new(MockRedfishClient::new("1.0.0", "2.1.0"));
    let observed = client.get_bios_version(&system_uri(0), Duration::from_secs(5)).await.unwrap();

    assert_eq!(reconciler::precheck_version(&observed, "2.1.0"), Some(BiosVersionState::Completed));
}

/// Scenario 4: a downgrade request fails immediately, same as an
/// incomparable version string, neither ever issuing a task.
#[tokio::test]
async fn downgrade_request_fails_without_a_task() {
    let client: Arc<dyn RedfishClient> = Arc::new(MockRedfishClient::new("1.0.0", "2.1.0"));
    let observed = client.get_bios_version(&system_uri(0), Duration::from_secs(5)).await.unwrap();

    assert_eq!(reconciler::precheck_version(&observed, "2.0.0"), Some(BiosVersionState::Failed));
}

/// Scenario 2: a genuine version mismatch runs the full five-checkpoint
/// sequence to Completed. The mock never flashes anything on its own, so
/// the post-update version is set explicitly once the issued task
/// completes, the same way a real device would only start reporting it
/// after the task (and the forced reboot) takes effect.
#[tokio::test]
async fn version_mismatch_runs_the_five_checkpoint_sequence() {
    let mock = Arc::new(MockRedfishClient::new("1.0.0", "1.0.0"));
    let client: Arc<dyn RedfishClient> = mock.clone();
    let server = server();

    let observed = client.get_bios_version(&system_uri(0), Duration::from_secs(5)).await.unwrap();
    assert_eq!(reconciler::precheck_version(&observed, "2.1.0"), None);

    assert_eq!(decide(unbound_input(MaintenancePolicy::Enforced, false)), ArbiterAction::Grant);

    let mut status = BiosVersionStatus::default();

    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.state, BiosVersionState::InProgress);
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_UPGRADE_ISSUED);

    let task_uri = status.task_uri.clone().unwrap();
    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_UPGRADE_ISSUED, "still polling while the task is running");

    mock.complete_task(&task_uri);
    mock.set_bios_version("2.1.0");
    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_UPGRADE_COMPLETED);

    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_REBOOT_POWER_OFF);
    assert_eq!(mock.get_system_power_state(&system_uri(0), Duration::from_secs(5)).await.unwrap(), PowerState::Off);

    // First PowerOn pass issues power_on(); the condition only lands once
    // the device is observed back on, which takes a second pass.
    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_REBOOT_POWER_OFF);
    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_REBOOT_POWER_ON);

    status = reconciler::reconcile(&status, &server, "2.1.0", &image("2.1.0"), &client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.conditions.last().unwrap().type_, CONDITION_VERIFICATION_COMPLETED);
    assert_eq!(status.state, BiosVersionState::Completed);
}

/// Scenario 3: under OwnerApproval the arbiter withholds the grant until
/// the claim carries the approval annotation, and the upgrade makes no
/// progress in the meantime.
#[tokio::test]
async fn owner_approval_blocks_the_grant_until_approved() {
    assert_eq!(decide(unbound_input(MaintenancePolicy::OwnerApproval, false)), ArbiterAction::WaitForApproval);
    assert_eq!(decide(unbound_input(MaintenancePolicy::OwnerApproval, true)), ArbiterAction::Grant);
}
