//! BMCSecret CRD (cluster-scoped) — opaque credential pair, §6.
//!
//! Fields are stored base64-encoded once by the store's own secret
//! encoding convention; callers decode that layer, then decode a
//! second time per the project's own double-encoding convention
//! (`crate::secret::decode_credential`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.io",
    version = "v1alpha1",
    kind = "BMCSecret"
)]
#[serde(rename_all = "camelCase")]
pub struct BmcSecretSpec {
    /// Base64-encoded (once) username; decode twice per project convention.
    pub username: String,
    /// Base64-encoded (once) password; decode twice per project convention.
    pub password: String,
}
