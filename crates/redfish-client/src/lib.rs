//! Narrow async interface to a Redfish-style BMC (C1). Deliberately
//! independent of the `crds` crate: this library knows nothing about
//! Kubernetes objects, only about power, attributes and firmware tasks
//! on one device.

pub mod error;
pub mod http;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod r#trait;
pub mod types;

pub use error::RedfishError;
pub use http::{HttpRedfishClient, Transport};
#[cfg(feature = "test-util")]
pub use mock::MockRedfishClient;
pub use r#trait::RedfishClient;
pub use types::{
    AttributeDiff, AttributeMap, AttributeValue, FirmwareImage, FirmwareModule, PowerState, TaskState, TaskStatus, VersionOrder,
    compare_versions,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

/// Canonical Redfish system URI for a server behind its BMC's inventory
/// index. Every controller that calls into the per-system endpoints
/// derives it the same way, so it lives here rather than being
/// recomputed independently by each.
pub fn system_uri(bmc_index: u32) -> String {
    format!("/redfish/v1/Systems/{bmc_index}")
}

/// Ensures `logout` runs even when a reconciler returns early on error.
/// Reconcilers acquire one of these per reconcile pass rather than
/// calling `logout` themselves on every exit path (§4.1 "scoped
/// acquisition").
pub struct ClientGuard {
    client: Arc<dyn RedfishClient>,
    logout_timeout: Duration,
}

impl ClientGuard {
    pub fn new(client: Arc<dyn RedfishClient>, logout_timeout: Duration) -> Self {
        Self { client, logout_timeout }
    }

    pub fn client(&self) -> &Arc<dyn RedfishClient> {
        &self.client
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let client = self.client.clone();
        let timeout = self.logout_timeout;
        tokio::spawn(async move {
            if let Err(err) = client.logout(timeout).await {
                warn!(error = %err, "logout failed during client guard teardown");
            }
        });
    }
}
