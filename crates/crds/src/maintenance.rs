//! ServerMaintenance (namespaced) and BMCMaintenance (cluster-scoped,
//! §3/§9 expansion) CRDs, plus the policy/state types shared by both.
//!
//! The two kinds are deliberately separate Kubernetes kinds (they hold
//! different reference shapes and scoping), but share `MaintenancePolicy`
//! and `MaintenanceState` so `crates/maintenance`'s pure arbiter logic can
//! be generic over "holder" without duplicating the vocabulary.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::power::DesiredPower;
use crate::references::{ClusterRef, NamespacedRef};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum MaintenancePolicy {
    Enforced,
    OwnerApproval,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum MaintenanceState {
    #[default]
    Pending,
    InMaintenance,
    Completed,
    Failed,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "ServerMaintenance",
    namespaced,
    status = "ServerMaintenanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceSpec {
    pub server_ref: ClusterRef,
    pub policy: MaintenancePolicy,
    /// The object that owns this maintenance window (a BIOSVersion, a
    /// BMCSettings, a BIOSSettings, or an operator-created maintenance).
    /// `OwnerApproval` reads the approval annotation off this reference
    /// when it names a ServerClaim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<NamespacedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_power: Option<DesiredPower>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceStatus {
    pub state: MaintenanceState,
}

pub const SERVER_MAINTENANCE_FINALIZER: &str = "metal.dcops.io/server-maintenance";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BMCMaintenance",
    status = "BmcMaintenanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BmcMaintenanceSpec {
    pub bmc_ref: ClusterRef,
    pub policy: MaintenancePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<NamespacedRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BmcMaintenanceStatus {
    pub state: MaintenanceState,
}

pub const BMC_MAINTENANCE_FINALIZER: &str = "metal.dcops.io/bmc-maintenance";
