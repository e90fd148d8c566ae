//! Server CRD (cluster-scoped) — §3, §4.4.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::power::{DesiredPower, PowerState};
use crate::references::{ClusterRef, NamespacedRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "Server",
    status = "ServerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Reference to the BMC managing this server.
    pub bmc_ref: ClusterRef,

    /// Index of this server within its BMC's inventory (§3 invariant 2:
    /// the canonical Server name is a pure function of bmcRef + index).
    pub bmc_index: u32,

    /// Set by the server-claim reconciler (C5) when a claim binds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<NamespacedRef>,

    /// Set by the maintenance arbiter (C3) while a maintenance holds this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_ref: Option<NamespacedRef>,

    /// Desired BIOS/BMC settings bundle for this server, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_settings_ref: Option<NamespacedRef>,

    /// Desired boot configuration, set by the claim reconciler post-binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_configuration_ref: Option<NamespacedRef>,

    /// Desired power, set by the claim reconciler or a maintenance window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<DesiredPower>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ServerState {
    #[default]
    Initial,
    Discovery,
    Available,
    Reserved,
    Maintenance,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub state: ServerState,

    /// State to restore to when the current maintenance completes
    /// (Available or Reserved) — the "remembered field" in §4.3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_maintenance_state: Option<ServerState>,

    /// Power observed just before maintenance took over, restored on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_maintenance_power: Option<PowerState>,

    /// Canonical system identifier reported by the BMC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_uuid: Option<String>,

    #[serde(default)]
    pub power_state: PowerState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub const SERVER_FINALIZER: &str = "metal.dcops.io/server";

/// Pure function: derives the canonical Server object name from its BMC
/// and index (§3 invariant 2). Kept free-standing (not a method on a
/// `Server`) so both the server reconciler and the BMC↔server inventory
/// reconciler can call it without constructing a full object.
pub fn canonical_server_name(bmc_name: &str, index: u32) -> String {
    format!("{bmc_name}-srv-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_pure() {
        assert_eq!(canonical_server_name("bmc-a", 0), canonical_server_name("bmc-a", 0));
        assert_ne!(canonical_server_name("bmc-a", 0), canonical_server_name("bmc-a", 1));
        assert_ne!(canonical_server_name("bmc-a", 0), canonical_server_name("bmc-b", 0));
    }
}
