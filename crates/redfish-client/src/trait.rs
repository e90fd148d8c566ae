//! The narrow interface every reconciler depends on (§4.1).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RedfishError;
use crate::types::{AttributeDiff, AttributeMap, FirmwareImage, PowerState, TaskStatus};

/// A scoped BMC session. Every operation takes an explicit timeout;
/// callers are expected to race it against their own cancellation token
/// (§5 "Cancellation") rather than rely on this trait doing so itself.
#[async_trait]
pub trait RedfishClient: Send + Sync {
    async fn power_on(&self, system_uri: &str, timeout: Duration) -> Result<(), RedfishError>;
    async fn power_off(&self, system_uri: &str, timeout: Duration) -> Result<(), RedfishError>;
    async fn get_system_power_state(&self, system_uri: &str, timeout: Duration) -> Result<PowerState, RedfishError>;

    async fn get_bmc_version(&self, timeout: Duration) -> Result<String, RedfishError>;
    async fn get_bios_version(&self, system_uri: &str, timeout: Duration) -> Result<String, RedfishError>;

    async fn get_bmc_attributes(&self, keys: &[String], timeout: Duration) -> Result<AttributeMap, RedfishError>;
    async fn get_bios_attributes(&self, system_uri: &str, keys: &[String], timeout: Duration) -> Result<AttributeMap, RedfishError>;

    /// Whether applying `diff` requires a power cycle to take effect.
    async fn check_attributes_require_reset(&self, diff: &AttributeDiff, timeout: Duration) -> Result<bool, RedfishError>;

    async fn set_bmc_attributes_immediately(&self, diff: &AttributeDiff, timeout: Duration) -> Result<(), RedfishError>;
    async fn set_bios_attributes_on_reset(&self, system_uri: &str, diff: &AttributeDiff, timeout: Duration) -> Result<(), RedfishError>;

    /// Returns an opaque task URI, stored verbatim by the caller (§6).
    async fn issue_firmware_update(&self, image: &FirmwareImage, timeout: Duration) -> Result<String, RedfishError>;
    async fn poll_task(&self, task_uri: &str, timeout: Duration) -> Result<TaskStatus, RedfishError>;

    /// Releases whatever session state this client acquired. Every caller
    /// must invoke this on all exit paths; see `ClientGuard` for a
    /// `Drop`-based helper that calls it from a blocking context.
    async fn logout(&self, timeout: Duration) -> Result<(), RedfishError>;
}
