//! Shared typed condition used by every reconciler-owned Status.
//!
//! Conditions are the user-visible surface (see the bios-version and
//! settings state machines): each significant checkpoint appends one,
//! and the terminal state of an object is derived from the youngest
//! condition whose `type_` is considered authoritative by that kind's
//! reconciler.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Machine-readable condition kind, e.g. "UpgradeIssued", "RebootPowerOff".
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, reason: impl Into<String>, message: impl Into<String>, observed_generation: i64) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::True,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }

    pub fn failed(reason: impl Into<String>, message: impl Into<String>, observed_generation: i64) -> Self {
        Self {
            type_: "Failed".to_string(),
            status: ConditionStatus::True,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Appends `condition` unless the newest existing condition already has the
/// same `type_` and `reason` (idempotence under repeated reconciles of the
/// same checkpoint, §8 "reconciling any object twice produces no writes").
pub fn push_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    if let Some(last) = conditions.last() {
        if last.type_ == condition.type_ && last.reason == condition.reason {
            return false;
        }
    }
    conditions.push(condition);
    true
}
