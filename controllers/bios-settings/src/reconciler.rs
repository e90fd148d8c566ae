//! Applies `BIOSSettings.spec.attributes` to a Server's BIOS under an
//! exclusive maintenance hold (§4.7). Re-diffs the device on every
//! pass rather than tracking its own checkpoints: once the device
//! reflects the desired attributes the diff comes back empty and the
//! reconciler is naturally done, reboot or not.

use std::sync::Arc;
use std::time::Duration;

use crds::server::Server;
use crds::settings::{AttributeMap, SettingsState};
use redfish_client::{compare_versions, system_uri, RedfishClient, VersionOrder};
use settings_diff::diff;
use tracing::info;

use crate::error::ControllerError;

/// Applies one failed apply attempt against the configured retry budget
/// (§4.7 step 8), mirroring `bmc-settings`'s reconciler. `None` means the
/// budget is exhausted and the caller should go sticky-Failed.
pub fn next_retry_budget(remaining: Option<u32>, budget: u32) -> Option<u32> {
    remaining.unwrap_or(budget).checked_sub(1)
}

pub async fn reconcile(server: &Server, desired: &AttributeMap, desired_version: &str, client: &Arc<dyn RedfishClient>, timeout: Duration) -> Result<SettingsState, ControllerError> {
    let uri = system_uri(server.spec.bmc_index);

    let device_version = client.get_bios_version(&uri, timeout).await?;
    if compare_versions(&device_version, desired_version) != VersionOrder::Equal {
        info!(server = %server.metadata.name.clone().unwrap_or_default(), device_version = %device_version, desired_version = %desired_version, "bios version does not match desired state, awaiting version upgrade");
        return Ok(SettingsState::AwaitingVersionUpgrade);
    }

    let keys: Vec<String> = desired.keys().cloned().collect();
    let current = client.get_bios_attributes(&uri, &keys, timeout).await?;

    let result = diff(desired, &current);
    if !result.errors.is_empty() {
        let detail = result.errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        return Err(ControllerError::TypeMismatch(detail));
    }

    if result.diff.is_empty() {
        info!(server = %server.metadata.name.clone().unwrap_or_default(), "bios attributes already match desired state");
        return Ok(SettingsState::Applied);
    }

    client.set_bios_attributes_on_reset(&uri, &result.diff, timeout).await?;

    if client.check_attributes_require_reset(&result.diff, timeout).await? {
        client.power_off(&uri, timeout).await?;
        client.power_on(&uri, timeout).await?;
    }

    Ok(SettingsState::InProgress)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crds::references::ClusterRef;
    use crds::server::{Server, ServerSpec};
    use redfish_client::mock::MockRedfishClient;
    use redfish_client::types::{AttributeValue, PowerState};
    use redfish_client::RedfishClient;

    use super::*;

    fn server() -> Server {
        Server::new(
            "srv-1",
            ServerSpec { bmc_ref: ClusterRef::new("bmc-1"), bmc_index: 0, claim_ref: None, maintenance_ref: None, bios_settings_ref: None, boot_configuration_ref: None, power: None },
        )
    }

    fn desired(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn already_matching_attributes_are_applied() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bios_attributes([("BootMode".to_string(), AttributeValue::Text("Uefi".to_string()))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let result = reconcile(&server(), &desired(&[("BootMode", "Uefi")]), "2.1.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result, SettingsState::Applied);
    }

    #[tokio::test]
    async fn version_mismatch_defers_attribute_diff() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bios_attributes([("BootMode".to_string(), AttributeValue::Text("Uefi".to_string()))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let result = reconcile(&server(), &desired(&[("BootMode", "Uefi")]), "2.2.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result, SettingsState::AwaitingVersionUpgrade);
    }

    #[test]
    fn retry_budget_decrements_then_exhausts() {
        let first = next_retry_budget(None, 2);
        assert_eq!(first, Some(1));
        assert_eq!(next_retry_budget(first, 2), Some(0));
        assert_eq!(next_retry_budget(Some(0), 2), None);
    }

    #[tokio::test]
    async fn type_mismatched_desired_value_is_an_error() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bios_attributes([("MaxTemp".to_string(), AttributeValue::Integer(80))].into_iter().collect());
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let err = reconcile(&server(), &desired(&[("MaxTemp", "hot")]), "2.1.0", &client, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ControllerError::TypeMismatch(_)));
    }

    #[tokio::test]
    async fn differing_attribute_applies_on_reset_and_power_cycles() {
        let mock = MockRedfishClient::new("1.0.0", "2.1.0");
        mock.seed_bios_attributes([("BootMode".to_string(), AttributeValue::Text("Legacy".to_string()))].into_iter().collect());
        mock.set_power(PowerState::On);
        let client: Arc<dyn RedfishClient> = Arc::new(mock);

        let result = reconcile(&server(), &desired(&[("BootMode", "Uefi")]), "2.1.0", &client, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result, SettingsState::InProgress);

        let power = client.get_system_power_state(&system_uri(0), Duration::from_secs(5)).await.unwrap();
        assert_eq!(power, PowerState::On);
    }
}
