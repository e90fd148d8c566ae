//! BIOSVersion CRD (namespaced) — §3, §4.6.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::firmware_image::FirmwareImage;
use crate::maintenance::MaintenancePolicy;
use crate::references::{ClusterRef, NamespacedRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BIOSVersion",
    namespaced,
    status = "BiosVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BiosVersionSpec {
    pub server_ref: ClusterRef,
    /// Desired firmware version string, compared against the device's
    /// reported version with `metal_versions::compare` (§9).
    pub version: String,
    pub image: FirmwareImage,
    pub maintenance_policy: MaintenancePolicy,
    /// Adopt an existing ServerMaintenance instead of creating one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_ref: Option<NamespacedRef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BiosVersionState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BiosVersionStatus {
    pub state: BiosVersionState,
    /// Resolved maintenance, whether adopted or created by this reconciler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_ref: Option<NamespacedRef>,
    /// Task URI as returned by the device; persisted verbatim, §6.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_uri: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const BIOS_VERSION_FINALIZER: &str = "metal.dcops.io/bios-version";

/// Operator annotation key shared by every kind with a terminal Failed
/// state; its value distinguishes `retry-failed` (escape Failed only)
/// from `retry` (restart from Pending unconditionally), §6.
pub const ANNOTATION_OPERATION: &str = "operation";
pub const OPERATION_RETRY_FAILED: &str = "retry-failed";
pub const OPERATION_RETRY: &str = "retry";

pub const CONDITION_UPGRADE_ISSUED: &str = "UpgradeIssued";
pub const CONDITION_UPGRADE_COMPLETED: &str = "UpgradeCompleted";
pub const CONDITION_REBOOT_POWER_OFF: &str = "RebootPowerOff";
pub const CONDITION_REBOOT_POWER_ON: &str = "RebootPowerOn";
pub const CONDITION_VERIFICATION_COMPLETED: &str = "VerificationCompleted";
pub const CONDITION_FAILED: &str = "Failed";
