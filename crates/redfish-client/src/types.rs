//! Wire-adjacent types the device client trades in (§4.1).

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Paused,
    Unknown,
}

/// Type-preserving attribute value, so the settings-diff core (C7) can
/// type-align desired (always a string in the CRD) against observed
/// before comparing, rather than falling back to string comparison for
/// every attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Text(v) => write!(f, "{v}"),
        }
    }
}

pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Keys whose desired value differs from the device's current value,
/// already type-aligned (C7 step 2-3).
pub type AttributeDiff = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareModule {
    Bios,
    Bmc,
}

/// Opaque image descriptor (§6); reconcilers never inspect these fields,
/// only pass the whole struct to `issue_firmware_update`.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    pub updated_version: String,
    pub resource_uri: String,
    pub module: FirmwareModule,
}

/// Compares two version strings with semver-aware ordering where
/// possible (§9's resolved Open Question), falling back to an
/// equality-only comparison when `version-compare` can't parse either
/// side — never guessing a direction for an incomparable pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Less,
    Equal,
    Greater,
    Incomparable,
}

pub fn compare_versions(current: &str, desired: &str) -> VersionOrder {
    if current == desired {
        return VersionOrder::Equal;
    }
    match version_compare::compare(current, desired) {
        Ok(version_compare::Cmp::Lt) => VersionOrder::Less,
        Ok(version_compare::Cmp::Eq) => VersionOrder::Equal,
        Ok(version_compare::Cmp::Gt) => VersionOrder::Greater,
        _ => VersionOrder::Incomparable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_upgrade() {
        assert_eq!(compare_versions("1.2.0", "1.3.0"), VersionOrder::Less);
    }

    #[test]
    fn detects_downgrade() {
        assert_eq!(compare_versions("1.3.0", "1.2.0"), VersionOrder::Greater);
    }

    #[test]
    fn detects_equal() {
        assert_eq!(compare_versions("1.2.0", "1.2.0"), VersionOrder::Equal);
    }

    #[test]
    fn falls_back_to_equality_for_unparseable_strings() {
        // Free-form vendor version strings ("P80 v1.45 (12/06/2017)") are not
        // semver; version-compare can't order them, so anything other than
        // an exact match is Incomparable rather than a guessed direction.
        assert_eq!(
            compare_versions("P80 v1.45 (12/06/2017)", "P80 v1.45 (12/06/2017)"),
            VersionOrder::Equal
        );
        assert_eq!(
            compare_versions("P80 v1.44 (01/01/2017)", "P80 v1.45 (12/06/2017)"),
            VersionOrder::Incomparable
        );
    }
}
