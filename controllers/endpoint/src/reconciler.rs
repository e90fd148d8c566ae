//! Endpoint materialization (C0, §4.8): a discovered MAC becomes a BMC
//! plus a BMCSecret seeded with the vendor's default credentials,
//! double-base64-encoded per this project's own secret convention.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crds::mac_db::{default_credentials, lookup_manufacturer};

use crate::error::ControllerError;

/// Resolved plan for materializing one endpoint: the BMC name to create
/// and its seed credentials, already double-encoded the way
/// `crds::secret::decode_bmc_secret` expects to unwind them.
#[derive(Debug, Clone)]
pub struct MaterializationPlan {
    pub manufacturer: String,
    pub username_encoded: String,
    pub password_encoded: String,
}

fn double_encode(value: &str) -> String {
    STANDARD.encode(STANDARD.encode(value))
}

pub fn plan_for_mac(mac: &str) -> Result<MaterializationPlan, ControllerError> {
    let manufacturer = lookup_manufacturer(mac).ok_or_else(|| ControllerError::UnrecognizedVendor(mac.to_string()))?;
    let creds = default_credentials(manufacturer);
    Ok(MaterializationPlan { manufacturer: manufacturer.to_string(), username_encoded: double_encode(creds.username), password_encoded: double_encode(creds.password) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vendor_produces_a_plan() {
        let plan = plan_for_mac("b8:2a:72:aa:bb:cc").unwrap();
        assert_eq!(plan.manufacturer, "Dell");
        assert!(!plan.username_encoded.is_empty());
    }

    #[test]
    fn unknown_vendor_is_rejected() {
        assert!(plan_for_mac("ff:ff:ff:aa:bb:cc").is_err());
    }

    #[test]
    fn encoding_round_trips_through_the_shared_decoder() {
        let plan = plan_for_mac("70:10:6f:aa:bb:cc").unwrap();
        let decoded = crds::secret::decode_credential("username", &plan.username_encoded).unwrap();
        assert_eq!(decoded, "Administrator");
    }
}
