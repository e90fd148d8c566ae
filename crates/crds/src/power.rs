//! Power state mirrored from the BMC by the server reconciler (C4).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PowerState {
    On,
    Off,
    Paused,
    #[default]
    Unknown,
}

/// Desired power requested by a claim, a maintenance window, or an
/// operator annotation. A subset of `PowerState` that excludes the
/// read-only observations `Paused`/`Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DesiredPower {
    On,
    Off,
}

impl From<DesiredPower> for PowerState {
    fn from(value: DesiredPower) -> Self {
        match value {
            DesiredPower::On => PowerState::On,
            DesiredPower::Off => PowerState::Off,
        }
    }
}
