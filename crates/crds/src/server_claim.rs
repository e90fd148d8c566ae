//! ServerClaim CRD (namespaced) — §3, §4.5.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::power::DesiredPower;
use crate::references::{ClusterRef, NamespacedRef};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BootSpec {
    pub image: String,
    pub ignition_secret_ref: NamespacedRef,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "ServerClaim",
    namespaced,
    status = "ServerClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimSpec {
    /// Direct reference to a Server. Takes precedence over `server_selector`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<ClusterRef>,

    /// Label selector used when `server_ref` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<BTreeMap<String, String>>,

    pub power: DesiredPower,
    pub boot: BootSpec,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClaimPhase {
    #[default]
    Unbound,
    Bound,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimStatus {
    pub phase: ClaimPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_server_ref: Option<ClusterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_configuration_ref: Option<NamespacedRef>,
}

pub const SERVER_CLAIM_FINALIZER: &str = "metal.dcops.io/server-claim";
pub const ANNOTATION_MAINTENANCE_APPROVED: &str = "maintenance-approved";
