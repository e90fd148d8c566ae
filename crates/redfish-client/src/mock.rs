//! In-memory stand-in for a real BMC, used by controller tests so they
//! never need live hardware. Mirrors the shape of the netbox-client
//! mock used elsewhere in this workspace, plus the scripted power/task
//! state a Redfish mock needs (see the bmc-mock examples this is
//! grounded on).

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RedfishError;
use crate::r#trait::RedfishClient;
use crate::types::{AttributeDiff, AttributeMap, FirmwareImage, PowerState, TaskState, TaskStatus};

#[derive(Debug, Clone)]
struct MockState {
    power: PowerState,
    bmc_version: String,
    bios_version: String,
    bmc_attributes: AttributeMap,
    bios_attributes: AttributeMap,
    tasks: BTreeMap<String, TaskStatus>,
    next_task_id: u64,
    fail_next: Option<RedfishError>,
    logged_out: bool,
}

/// A scripted Redfish device. Construct with [`MockRedfishClient::new`],
/// seed it via the setter methods, then hand it to a reconciler behind
/// an `Arc<dyn RedfishClient>`.
pub struct MockRedfishClient {
    state: Mutex<MockState>,
}

impl MockRedfishClient {
    pub fn new(bmc_version: impl Into<String>, bios_version: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                power: PowerState::Off,
                bmc_version: bmc_version.into(),
                bios_version: bios_version.into(),
                bmc_attributes: AttributeMap::new(),
                bios_attributes: AttributeMap::new(),
                tasks: BTreeMap::new(),
                next_task_id: 1,
                fail_next: None,
                logged_out: false,
            }),
        }
    }

    pub fn set_power(&self, state: PowerState) {
        self.state.lock().unwrap().power = state;
    }

    pub fn seed_bmc_attributes(&self, attrs: AttributeMap) {
        self.state.lock().unwrap().bmc_attributes = attrs;
    }

    /// Simulates a firmware task taking effect: the mock never flashes
    /// anything itself, so a caller scripting an upgrade scenario sets
    /// the post-update version explicitly once the task it issued
    /// completes.
    pub fn set_bmc_version(&self, version: impl Into<String>) {
        self.state.lock().unwrap().bmc_version = version.into();
    }

    pub fn set_bios_version(&self, version: impl Into<String>) {
        self.state.lock().unwrap().bios_version = version.into();
    }

    pub fn seed_bios_attributes(&self, attrs: AttributeMap) {
        self.state.lock().unwrap().bios_attributes = attrs;
    }

    /// Make exactly the next call fail with `err`, regardless of which
    /// method is invoked. Used to exercise retry/backoff paths.
    pub fn fail_next_call(&self, err: RedfishError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    pub fn complete_task(&self, task_uri: &str) {
        let mut state = self.state.lock().unwrap();
        state.tasks.insert(task_uri.to_string(), TaskStatus { state: TaskState::Completed, error: None });
    }

    pub fn fail_task(&self, task_uri: &str, error: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.tasks.insert(task_uri.to_string(), TaskStatus { state: TaskState::Failed, error: Some(error.into()) });
    }

    pub fn was_logged_out(&self) -> bool {
        self.state.lock().unwrap().logged_out
    }

    fn take_scripted_failure(&self) -> Option<RedfishError> {
        self.state.lock().unwrap().fail_next.take()
    }
}

#[async_trait]
impl RedfishClient for MockRedfishClient {
    async fn power_on(&self, _system_uri: &str, _timeout: Duration) -> Result<(), RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        self.state.lock().unwrap().power = PowerState::On;
        Ok(())
    }

    async fn power_off(&self, _system_uri: &str, _timeout: Duration) -> Result<(), RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        self.state.lock().unwrap().power = PowerState::Off;
        Ok(())
    }

    async fn get_system_power_state(&self, _system_uri: &str, _timeout: Duration) -> Result<PowerState, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        Ok(self.state.lock().unwrap().power)
    }

    async fn get_bmc_version(&self, _timeout: Duration) -> Result<String, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        Ok(self.state.lock().unwrap().bmc_version.clone())
    }

    async fn get_bios_version(&self, _system_uri: &str, _timeout: Duration) -> Result<String, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        Ok(self.state.lock().unwrap().bios_version.clone())
    }

    async fn get_bmc_attributes(&self, keys: &[String], _timeout: Duration) -> Result<AttributeMap, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let state = self.state.lock().unwrap();
        Ok(state.bmc_attributes.iter().filter(|(k, _)| keys.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn get_bios_attributes(&self, _system_uri: &str, keys: &[String], _timeout: Duration) -> Result<AttributeMap, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let state = self.state.lock().unwrap();
        Ok(state.bios_attributes.iter().filter(|(k, _)| keys.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn check_attributes_require_reset(&self, diff: &AttributeDiff, _timeout: Duration) -> Result<bool, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        Ok(!diff.is_empty())
    }

    async fn set_bmc_attributes_immediately(&self, diff: &AttributeDiff, _timeout: Duration) -> Result<(), RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        for (key, value) in diff {
            state.bmc_attributes.insert(key.clone(), crate::types::AttributeValue::Text(value.clone()));
        }
        Ok(())
    }

    async fn set_bios_attributes_on_reset(&self, _system_uri: &str, diff: &AttributeDiff, _timeout: Duration) -> Result<(), RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        for (key, value) in diff {
            state.bios_attributes.insert(key.clone(), crate::types::AttributeValue::Text(value.clone()));
        }
        Ok(())
    }

    async fn issue_firmware_update(&self, _image: &FirmwareImage, _timeout: Duration) -> Result<String, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_task_id;
        state.next_task_id += 1;
        let task_uri = format!("/redfish/v1/TaskService/Tasks/{id}");
        state.tasks.insert(task_uri.clone(), TaskStatus { state: TaskState::Running, error: None });
        Ok(task_uri)
    }

    async fn poll_task(&self, task_uri: &str, _timeout: Duration) -> Result<TaskStatus, RedfishError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let state = self.state.lock().unwrap();
        state
            .tasks
            .get(task_uri)
            .cloned()
            .ok_or_else(|| RedfishError::Protocol(format!("unknown task {task_uri}")))
    }

    async fn logout(&self, _timeout: Duration) -> Result<(), RedfishError> {
        self.state.lock().unwrap().logged_out = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let client = MockRedfishClient::new("1.0", "1.0");
        client.fail_next_call(RedfishError::Timeout);
        let first = client.get_bmc_version(Duration::from_secs(1)).await;
        assert!(matches!(first, Err(RedfishError::Timeout)));
        let second = client.get_bmc_version(Duration::from_secs(1)).await;
        assert_eq!(second.unwrap(), "1.0");
    }

    #[tokio::test]
    async fn version_setters_take_effect_immediately() {
        let client = MockRedfishClient::new("1.0", "1.0");
        client.set_bios_version("2.0");
        assert_eq!(client.get_bios_version("/redfish/v1/Systems/0", Duration::from_secs(1)).await.unwrap(), "2.0");
        client.set_bmc_version("3.0");
        assert_eq!(client.get_bmc_version(Duration::from_secs(1)).await.unwrap(), "3.0");
    }

    #[tokio::test]
    async fn power_cycle_round_trips() {
        let client = MockRedfishClient::new("1.0", "1.0");
        client.power_on("/redfish/v1/Systems/1", Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.get_system_power_state("/redfish/v1/Systems/1", Duration::from_secs(1)).await.unwrap(), PowerState::On);
        client.power_off("/redfish/v1/Systems/1", Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.get_system_power_state("/redfish/v1/Systems/1", Duration::from_secs(1)).await.unwrap(), PowerState::Off);
    }

    #[tokio::test]
    async fn firmware_task_lifecycle() {
        let client = MockRedfishClient::new("1.0", "1.0");
        let image = FirmwareImage { updated_version: "2.0".to_string(), resource_uri: "https://images/2.0.bin".to_string(), module: crate::types::FirmwareModule::Bmc };
        let task_uri = client.issue_firmware_update(&image, Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.poll_task(&task_uri, Duration::from_secs(1)).await.unwrap().state, TaskState::Running);
        client.complete_task(&task_uri);
        assert_eq!(client.poll_task(&task_uri, Duration::from_secs(1)).await.unwrap().state, TaskState::Completed);
    }
}
