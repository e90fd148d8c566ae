//! Object references for cross-resource links.
//!
//! Generalized from the teacher's `NetBoxResourceReference`: a plain
//! name/namespace/uid pointer, since every kind here lives under a
//! single API group and the `kind` is almost always implied by the
//! field it's stored in.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a cluster-scoped object (no namespace).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl ClusterRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), uid: None }
    }

    pub fn with_uid(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self { name: name.into(), uid: Some(uid.into()) }
    }
}

/// Reference to a namespaced object. Namespace defaults to the referencing
/// object's own namespace when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl NamespacedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: None, uid: None }
    }

    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}
