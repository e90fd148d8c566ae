//! Five-checkpoint BIOS upgrade sequence (§4.6): UpgradeIssued →
//! UpgradeCompleted → RebootPowerOff → RebootPowerOn →
//! VerificationCompleted. Each checkpoint is a [`Condition`] appended to
//! status; [`next_step`] is the pure function deciding which checkpoint
//! comes next from what's already recorded, so the sequence itself is
//! testable without a device.

use std::sync::Arc;
use std::time::Duration;

use crds::bios_version::{
    BiosVersionState, BiosVersionStatus, CONDITION_REBOOT_POWER_OFF, CONDITION_REBOOT_POWER_ON, CONDITION_UPGRADE_COMPLETED, CONDITION_UPGRADE_ISSUED, CONDITION_VERIFICATION_COMPLETED,
};
use crds::conditions::{push_condition, Condition};
use crds::server::Server;
use redfish_client::{compare_versions, system_uri, FirmwareImage as DeviceFirmwareImage, FirmwareModule as DeviceFirmwareModule, PowerState, RedfishClient, TaskState, VersionOrder};
use tracing::info;

use crate::error::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    IssueUpgrade,
    PollTask,
    PowerOff,
    PowerOn,
    VerifyVersion,
    Done,
}

/// Before any maintenance hold is taken, compares the device's currently
/// reported version against what's desired (§8 scenarios 1/4). `None`
/// means the upgrade should proceed as normal; `Some` short-circuits
/// straight to a terminal state without ever creating a maintenance.
pub fn precheck_version(observed: &str, desired_version: &str) -> Option<BiosVersionState> {
    match compare_versions(observed, desired_version) {
        VersionOrder::Equal => Some(BiosVersionState::Completed),
        VersionOrder::Greater | VersionOrder::Incomparable => Some(BiosVersionState::Failed),
        VersionOrder::Less => None,
    }
}

/// Looks at the youngest condition to decide what the reconciler should
/// attempt this pass. Conditions are append-only checkpoints, never
/// rewound, so the last one pushed is always the furthest point reached.
pub fn next_step(status: &BiosVersionStatus) -> Step {
    match status.conditions.last().map(|c| c.type_.as_str()) {
        None => Step::IssueUpgrade,
        Some(t) if t == CONDITION_UPGRADE_ISSUED => Step::PollTask,
        Some(t) if t == CONDITION_UPGRADE_COMPLETED => Step::PowerOff,
        Some(t) if t == CONDITION_REBOOT_POWER_OFF => Step::PowerOn,
        Some(t) if t == CONDITION_REBOOT_POWER_ON => Step::VerifyVersion,
        Some(t) if t == CONDITION_VERIFICATION_COMPLETED => Step::Done,
        _ => Step::Done,
    }
}

pub async fn reconcile(
    status: &BiosVersionStatus,
    server: &Server,
    desired_version: &str,
    image: &crds::firmware_image::FirmwareImage,
    client: &Arc<dyn RedfishClient>,
    timeout: Duration,
) -> Result<BiosVersionStatus, ControllerError> {
    let mut status = status.clone();
    let generation = server.metadata.generation.unwrap_or(0);
    let uri = system_uri(server.spec.bmc_index);

    match next_step(&status) {
        Step::IssueUpgrade => {
            let device_image = DeviceFirmwareImage {
                updated_version: image.updated_version.clone(),
                resource_uri: image.resource_uri.clone(),
                module: match image.module {
                    crds::firmware_image::FirmwareModule::Bios => DeviceFirmwareModule::Bios,
                    crds::firmware_image::FirmwareModule::Bmc => DeviceFirmwareModule::Bmc,
                },
            };
            let task_uri = client.issue_firmware_update(&device_image, timeout).await?;
            status.task_uri = Some(task_uri.clone());
            push_condition(&mut status.conditions, Condition::new(CONDITION_UPGRADE_ISSUED, "TaskCreated", format!("firmware task {task_uri} issued"), generation));
            status.state = BiosVersionState::InProgress;
        }
        Step::PollTask => {
            let task_uri = status.task_uri.clone().unwrap_or_default();
            let task = client.poll_task(&task_uri, timeout).await?;
            match task.state {
                TaskState::Completed => {
                    push_condition(&mut status.conditions, Condition::new(CONDITION_UPGRADE_COMPLETED, "TaskCompleted", "device reports the firmware task completed", generation));
                }
                TaskState::Running => {}
                TaskState::Failed => {
                    let message = task.error.unwrap_or_else(|| "firmware task failed with no detail".to_string());
                    status.state = BiosVersionState::Failed;
                    push_condition(&mut status.conditions, Condition::failed("TaskFailed", message.clone(), generation));
                    return Err(ControllerError::TaskFailed(task_uri, message));
                }
            }
        }
        Step::PowerOff => {
            client.power_off(&uri, timeout).await?;
            push_condition(&mut status.conditions, Condition::new(CONDITION_REBOOT_POWER_OFF, "PowerCycled", "powered off to apply the update", generation));
        }
        Step::PowerOn => {
            let power = client.get_system_power_state(&uri, timeout).await?;
            if power == PowerState::Off {
                client.power_on(&uri, timeout).await?;
            }
            if power == PowerState::On {
                push_condition(&mut status.conditions, Condition::new(CONDITION_REBOOT_POWER_ON, "PoweredOn", "server powered back on after the update", generation));
            }
        }
        Step::VerifyVersion => {
            let observed = client.get_bios_version(&uri, timeout).await?;
            if compare_versions(&observed, desired_version) == redfish_client::VersionOrder::Equal {
                push_condition(&mut status.conditions, Condition::new(CONDITION_VERIFICATION_COMPLETED, "VersionMatches", format!("device reports version {observed}"), generation));
                status.state = BiosVersionState::Completed;
                info!(server = %server.metadata.name.clone().unwrap_or_default(), version = %observed, "bios upgrade verified");
            }
        }
        Step::Done => {}
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(type_: &str) -> Condition {
        Condition::new(type_, "r", "m", 1)
    }

    #[test]
    fn precheck_matching_version_completes_without_a_task() {
        assert_eq!(precheck_version("2.1.0", "2.1.0"), Some(BiosVersionState::Completed));
    }

    #[test]
    fn precheck_downgrade_fails_without_a_task() {
        assert_eq!(precheck_version("2.1.0", "2.0.0"), Some(BiosVersionState::Failed));
    }

    #[test]
    fn precheck_incomparable_version_fails() {
        assert_eq!(precheck_version("weird", "2.1.0"), Some(BiosVersionState::Failed));
    }

    #[test]
    fn precheck_upgrade_proceeds() {
        assert_eq!(precheck_version("2.0.0", "2.1.0"), None);
    }

    #[test]
    fn no_conditions_issues_upgrade() {
        assert_eq!(next_step(&BiosVersionStatus::default()), Step::IssueUpgrade);
    }

    #[test]
    fn issued_polls_next() {
        let status = BiosVersionStatus { conditions: vec![condition(CONDITION_UPGRADE_ISSUED)], ..Default::default() };
        assert_eq!(next_step(&status), Step::PollTask);
    }

    #[test]
    fn completed_upgrade_powers_off() {
        let status = BiosVersionStatus { conditions: vec![condition(CONDITION_UPGRADE_ISSUED), condition(CONDITION_UPGRADE_COMPLETED)], ..Default::default() };
        assert_eq!(next_step(&status), Step::PowerOff);
    }

    #[test]
    fn powered_off_powers_on() {
        let status = BiosVersionStatus { conditions: vec![condition(CONDITION_REBOOT_POWER_OFF)], ..Default::default() };
        assert_eq!(next_step(&status), Step::PowerOn);
    }

    #[test]
    fn powered_on_verifies() {
        let status = BiosVersionStatus { conditions: vec![condition(CONDITION_REBOOT_POWER_ON)], ..Default::default() };
        assert_eq!(next_step(&status), Step::VerifyVersion);
    }

    #[test]
    fn verified_is_done() {
        let status = BiosVersionStatus { conditions: vec![condition(CONDITION_VERIFICATION_COMPLETED)], ..Default::default() };
        assert_eq!(next_step(&status), Step::Done);
    }
}
