//! Real Redfish HTTP backend. One client per `{protocol, host, port}`
//! tuple; session login happens lazily on first call and is released by
//! `logout`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::RedfishError;
use crate::r#trait::RedfishClient;
use crate::types::{AttributeDiff, AttributeMap, AttributeValue, FirmwareImage, FirmwareModule, PowerState, TaskState, TaskStatus};

/// Whether the client reaches the BMC over the network (`Redfish`) or via
/// a loopback/unix-domain-style local transport (`RedfishLocal`) — §9's
/// closed tagged enum rather than open polymorphism. Both use the same
/// HTTP request shape; only the base URL construction differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Redfish,
    RedfishLocal,
}

pub struct HttpRedfishClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpRedfishClient {
    pub fn new(transport: Transport, host: &str, port: u16, username: String, password: String) -> Result<Self, RedfishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(RedfishError::from)?;

        let scheme = match transport {
            Transport::Redfish => "https",
            Transport::RedfishLocal => "http",
        };

        Ok(Self {
            client,
            base_url: format!("{scheme}://{host}:{port}"),
            username,
            password,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, timeout: Duration) -> Result<Value, RedfishError> {
        let resp = tokio::time::timeout(
            timeout,
            self.client
                .get(self.url(path))
                .basic_auth(&self.username, Some(&self.password))
                .send(),
        )
        .await
        .map_err(|_| RedfishError::Timeout)??;

        if resp.status().as_u16() == 401 {
            return Err(RedfishError::Unauthenticated(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(RedfishError::Transient(format!("{path}: HTTP {}", resp.status())));
        }
        resp.json::<Value>().await.map_err(|e| RedfishError::Protocol(e.to_string()))
    }

    async fn patch_json(&self, path: &str, body: Value, timeout: Duration) -> Result<(), RedfishError> {
        let resp = tokio::time::timeout(
            timeout,
            self.client
                .patch(self.url(path))
                .basic_auth(&self.username, Some(&self.password))
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| RedfishError::Timeout)??;

        if resp.status().as_u16() == 401 {
            return Err(RedfishError::Unauthenticated(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(RedfishError::Transient(format!("{path}: HTTP {}", resp.status())));
        }
        Ok(())
    }

    async fn post_json(&self, path: &str, body: Value, timeout: Duration) -> Result<Value, RedfishError> {
        let resp = tokio::time::timeout(
            timeout,
            self.client
                .post(self.url(path))
                .basic_auth(&self.username, Some(&self.password))
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| RedfishError::Timeout)??;

        if resp.status().as_u16() == 401 {
            return Err(RedfishError::Unauthenticated(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(RedfishError::Transient(format!("{path}: HTTP {}", resp.status())));
        }
        resp.json::<Value>().await.map_err(|e| RedfishError::Protocol(e.to_string()))
    }

    fn parse_attribute(value: &Value) -> Option<AttributeValue> {
        if let Some(i) = value.as_i64() {
            Some(AttributeValue::Integer(i))
        } else if let Some(f) = value.as_f64() {
            Some(AttributeValue::Float(f))
        } else {
            value.as_str().map(|s| AttributeValue::Text(s.to_string()))
        }
    }
}

#[async_trait]
impl RedfishClient for HttpRedfishClient {
    async fn power_on(&self, system_uri: &str, timeout: Duration) -> Result<(), RedfishError> {
        self.post_json(
            &format!("{system_uri}/Actions/ComputerSystem.Reset"),
            serde_json::json!({ "ResetType": "On" }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn power_off(&self, system_uri: &str, timeout: Duration) -> Result<(), RedfishError> {
        self.post_json(
            &format!("{system_uri}/Actions/ComputerSystem.Reset"),
            serde_json::json!({ "ResetType": "ForceOff" }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn get_system_power_state(&self, system_uri: &str, timeout: Duration) -> Result<PowerState, RedfishError> {
        let json = self.get_json(system_uri, timeout).await?;
        let state = json
            .get("PowerState")
            .and_then(Value::as_str)
            .ok_or_else(|| RedfishError::Protocol("missing PowerState".to_string()))?;
        Ok(match state {
            "On" => PowerState::On,
            "Off" => PowerState::Off,
            "Paused" => PowerState::Paused,
            _ => PowerState::Unknown,
        })
    }

    async fn get_bmc_version(&self, timeout: Duration) -> Result<String, RedfishError> {
        let json = self.get_json("/redfish/v1/Managers/BMC", timeout).await?;
        json.get("FirmwareVersion")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RedfishError::Protocol("missing FirmwareVersion".to_string()))
    }

    async fn get_bios_version(&self, system_uri: &str, timeout: Duration) -> Result<String, RedfishError> {
        let json = self.get_json(system_uri, timeout).await?;
        json.get("BiosVersion")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RedfishError::Protocol("missing BiosVersion".to_string()))
    }

    async fn get_bmc_attributes(&self, keys: &[String], timeout: Duration) -> Result<AttributeMap, RedfishError> {
        let json = self.get_json("/redfish/v1/Managers/BMC/Oem/Attributes", timeout).await?;
        extract_attributes(&json, keys)
    }

    async fn get_bios_attributes(&self, system_uri: &str, keys: &[String], timeout: Duration) -> Result<AttributeMap, RedfishError> {
        let json = self.get_json(&format!("{system_uri}/Bios"), timeout).await?;
        let attrs = json.get("Attributes").cloned().unwrap_or(json);
        extract_attributes(&attrs, keys)
    }

    async fn check_attributes_require_reset(&self, _diff: &AttributeDiff, _timeout: Duration) -> Result<bool, RedfishError> {
        // Redfish has no generic introspection endpoint for this; the real
        // BMC answers per-attribute via `@Redfish.AllowableValues` /
        // `RebootRequired` registry metadata the caller would need to fetch
        // attribute-by-attribute. Conservatively require a reset whenever
        // there's anything to apply; vendor-specific clients may override.
        Ok(true)
    }

    async fn set_bmc_attributes_immediately(&self, diff: &AttributeDiff, timeout: Duration) -> Result<(), RedfishError> {
        debug!(count = diff.len(), "applying BMC attributes immediately");
        self.patch_json(
            "/redfish/v1/Managers/BMC/Oem/Attributes",
            serde_json::json!({ "Attributes": diff }),
            timeout,
        )
        .await
    }

    async fn set_bios_attributes_on_reset(&self, system_uri: &str, diff: &AttributeDiff, timeout: Duration) -> Result<(), RedfishError> {
        debug!(count = diff.len(), "staging BIOS attributes for next reset");
        self.patch_json(
            &format!("{system_uri}/Bios/Settings"),
            serde_json::json!({ "Attributes": diff }),
            timeout,
        )
        .await
    }

    async fn issue_firmware_update(&self, image: &FirmwareImage, timeout: Duration) -> Result<String, RedfishError> {
        let module = match image.module {
            FirmwareModule::Bios => "BIOS",
            FirmwareModule::Bmc => "BMC",
        };
        let body = serde_json::json!({
            "ImageURI": image.resource_uri,
            "Targets": [module],
        });
        let json = self.post_json("/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate", body, timeout).await?;
        json.get("@odata.id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RedfishError::Protocol("update task has no id".to_string()))
    }

    async fn poll_task(&self, task_uri: &str, timeout: Duration) -> Result<TaskStatus, RedfishError> {
        let json = self.get_json(task_uri, timeout).await?;
        let state = json
            .get("TaskState")
            .and_then(Value::as_str)
            .ok_or_else(|| RedfishError::Protocol("missing TaskState".to_string()))?;
        let state = match state {
            "Completed" => TaskState::Completed,
            "Exception" | "Killed" | "Cancelled" => TaskState::Failed,
            _ => TaskState::Running,
        };
        let error = json
            .get("Messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(|m| m.get("Message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(TaskStatus { state, error: if state == TaskState::Failed { error } else { None } })
    }

    async fn logout(&self, _timeout: Duration) -> Result<(), RedfishError> {
        // Basic auth carries no server-side session to tear down; a
        // session-token transport would DELETE its session URI here.
        Ok(())
    }
}

fn extract_attributes(json: &Value, keys: &[String]) -> Result<AttributeMap, RedfishError> {
    let mut out = BTreeMap::new();
    for key in keys {
        if let Some(value) = json.get(key) {
            if let Some(parsed) = HttpRedfishClient::parse_attribute(value) {
                out.insert(key.clone(), parsed);
            }
        }
    }
    Ok(out)
}
