//! BMCSettings (cluster-scoped, one BMC, possibly many servers behind it)
//! and BIOSSettings (namespaced, one server) CRDs — §3, §4.7.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::maintenance::MaintenancePolicy;
use crate::references::{ClusterRef, NamespacedRef};

pub type AttributeMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum SettingsState {
    #[default]
    Pending,
    InProgress,
    /// `spec.version` doesn't match the device's reported version; the
    /// attribute diff is not evaluated until a firmware workflow brings
    /// the device to the desired version (§4.7 steps 4-5).
    AwaitingVersionUpgrade,
    Applied,
    Failed,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BMCSettings",
    status = "BmcSettingsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BmcSettingsSpec {
    pub bmc_ref: ClusterRef,
    pub attributes: AttributeMap,
    pub version: String,
    pub maintenance_policy: MaintenancePolicy,
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BmcSettingsStatus {
    pub state: SettingsState,
    /// Exclusive BMC-level lock held for the duration of the apply (§3 expansion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_maintenance_ref: Option<ClusterRef>,
    /// One `ServerMaintenance` per server behind the BMC, all-or-nothing (§4.7).
    #[serde(default)]
    pub maintenance_refs: Vec<NamespacedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_retry_count_remaining: Option<u32>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const BMC_SETTINGS_FINALIZER: &str = "metal.dcops.io/bmc-settings";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BIOSSettings",
    namespaced,
    status = "BiosSettingsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BiosSettingsSpec {
    pub server_ref: ClusterRef,
    pub attributes: AttributeMap,
    pub version: String,
    pub maintenance_policy: MaintenancePolicy,
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BiosSettingsStatus {
    pub state: SettingsState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_ref: Option<NamespacedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_retry_count_remaining: Option<u32>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const BIOS_SETTINGS_FINALIZER: &str = "metal.dcops.io/bios-settings";
