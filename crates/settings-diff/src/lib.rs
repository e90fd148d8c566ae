//! Type-preserving attribute diff core (C7 steps 1-3). Pure and
//! I/O-free: callers fetch `current` for exactly the keys named in
//! `desired` themselves, then hand both maps here.

use std::collections::BTreeMap;
use std::fmt;

use redfish_client::types::{AttributeDiff, AttributeMap, AttributeValue};

/// A desired value couldn't be parsed as the type the device reports for
/// that key. Accumulated per-key rather than aborting the whole diff.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub key: String,
    pub desired: String,
    pub observed_type: &'static str,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attribute {}: desired value {:?} does not parse as {}", self.key, self.desired, self.observed_type)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub diff: AttributeDiff,
    pub errors: Vec<TypeMismatch>,
}

/// Computes which of `desired`'s keys differ from `current`, type-aligning
/// each desired string against the observed attribute's native type
/// before comparing. Keys present in `desired` but absent from `current`
/// (the device never reported them) are treated as differing.
pub fn diff(desired: &BTreeMap<String, String>, current: &AttributeMap) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, desired_value) in desired {
        let Some(observed) = current.get(key) else {
            result.diff.insert(key.clone(), desired_value.clone());
            continue;
        };

        match type_align(observed, desired_value) {
            Ok(aligned) => {
                if aligned != *observed {
                    result.diff.insert(key.clone(), desired_value.clone());
                }
            }
            Err(observed_type) => {
                result.errors.push(TypeMismatch { key: key.clone(), desired: desired_value.clone(), observed_type });
            }
        }
    }

    result
}

fn type_align(observed: &AttributeValue, desired: &str) -> Result<AttributeValue, &'static str> {
    match observed {
        AttributeValue::Integer(_) => desired.parse::<i64>().map(AttributeValue::Integer).map_err(|_| "integer"),
        AttributeValue::Float(_) => desired.parse::<f64>().map(AttributeValue::Float).map_err(|_| "float"),
        AttributeValue::Text(_) => Ok(AttributeValue::Text(desired.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn no_diff_when_values_match() {
        let current = map(&[("fooreboot", AttributeValue::Integer(144))]);
        let desired = BTreeMap::from([("fooreboot".to_string(), "144".to_string())]);
        let result = diff(&desired, &current);
        assert!(result.diff.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn detects_integer_change() {
        let current = map(&[("fooreboot", AttributeValue::Integer(144))]);
        let desired = BTreeMap::from([("fooreboot".to_string(), "145".to_string())]);
        let result = diff(&desired, &current);
        assert_eq!(result.diff.get("fooreboot"), Some(&"145".to_string()));
    }

    #[test]
    fn missing_key_counts_as_diff() {
        let current = AttributeMap::new();
        let desired = BTreeMap::from([("new_attr".to_string(), "on".to_string())]);
        let result = diff(&desired, &current);
        assert_eq!(result.diff.get("new_attr"), Some(&"on".to_string()));
    }

    #[test]
    fn unparseable_desired_is_a_nonfatal_error() {
        let current = map(&[("max_temp", AttributeValue::Integer(80))]);
        let desired = BTreeMap::from([
            ("max_temp".to_string(), "not-a-number".to_string()),
            ("fooreboot".to_string(), "1".to_string()),
        ]);
        let current = {
            let mut c = current;
            c.insert("fooreboot".to_string(), AttributeValue::Integer(0));
            c
        };
        let result = diff(&desired, &current);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key, "max_temp");
        assert_eq!(result.diff.get("fooreboot"), Some(&"1".to_string()));
    }

    #[test]
    fn text_attributes_always_parse() {
        let current = map(&[("label", AttributeValue::Text("old".to_string()))]);
        let desired = BTreeMap::from([("label".to_string(), "new".to_string())]);
        let result = diff(&desired, &current);
        assert_eq!(result.diff.get("label"), Some(&"new".to_string()));
        assert!(result.errors.is_empty());
    }
}
