//! ServerBootConfiguration CRD (namespaced) — derived from a bound claim,
//! consumed by an external network-boot service, §1/§3.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{ClusterRef, NamespacedRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "ServerBootConfiguration",
    namespaced,
    status = "ServerBootConfigurationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerBootConfigurationSpec {
    pub server_ref: ClusterRef,
    pub image: String,
    pub ignition_secret_ref: NamespacedRef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BootConfigurationState {
    #[default]
    Pending,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerBootConfigurationStatus {
    /// Populated by the external network-boot service (out of scope, §1); we
    /// only model the field, never write it ourselves.
    pub state: BootConfigurationState,
}
