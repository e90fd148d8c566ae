//! BMC CRD (cluster-scoped) — §3, §9 "dynamic dispatch on protocol".

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::ClusterRef;

/// Closed set of supported protocols. Modeled as a tagged enum per §9
/// rather than open polymorphism: the set of BMC transports is closed
/// and known at compile time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum BmcProtocol {
    Redfish,
    RedfishLocal,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineEndpoint {
    pub ip: String,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", untagged)]
pub enum BmcEndpoint {
    Reference(ClusterRef),
    Inline(InlineEndpoint),
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BMC",
    status = "BmcStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BmcSpec {
    pub endpoint: BmcEndpoint,
    pub protocol: BmcProtocol,
    pub port: u16,
    /// Reference to the `BMCSecret` carrying username/password.
    pub credentials_ref: ClusterRef,
    /// Desired settings bundle for this BMC (BMCSettings), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_settings_ref: Option<ClusterRef>,
    /// Number of Server entries this BMC manages (§4.8 inventory reconciliation).
    #[serde(default = "default_server_count")]
    pub server_count: u32,
}

fn default_server_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BmcEnablement {
    #[default]
    Enabled,
    Disabled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BmcStatus {
    pub state: BmcEnablement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
