//! Endpoint CRD (cluster-scoped) — discovered network endpoint keyed by
//! MAC; materialized into a BMC + BMCSecret by the endpoint reconciler
//! (C0, §4.8).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::ClusterRef;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "Endpoint",
    status = "EndpointStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    pub mac: String,
    pub ip: String,
}

pub const ENDPOINT_FINALIZER: &str = "metal.dcops.io/endpoint";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    /// Set once the MAC prefix is recognized and a BMC has been materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_ref: Option<ClusterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
