//! MAC-prefix (OUI) lookup leaf utility, §1/§4.8.
//!
//! The distilled spec describes this only through its interface to the
//! core: given a MAC address, identify the manufacturer so the endpoint
//! reconciler can pick a default-credential template. A handful of
//! well-known BMC vendor OUIs are embedded; unrecognized prefixes are
//! reported as such rather than guessed.

const KNOWN_OUIS: &[(&str, &str)] = &[
    ("00:25:90", "Supermicro"),
    ("3c:ec:ef", "Supermicro"),
    ("b8:2a:72", "Dell"),
    ("d0:94:66", "Dell"),
    ("70:10:6f", "HPE"),
    ("98:f2:b3", "HPE"),
    ("00:0a:f7", "Lenovo"),
];

/// Default BMC credential template for a manufacturer. Not a real secret
/// store — a seed value an operator is expected to rotate immediately,
/// following the convention of most vendor out-of-box BMC defaults.
pub struct DefaultCredentials {
    pub username: &'static str,
    pub password: &'static str,
}

pub fn lookup_manufacturer(mac: &str) -> Option<&'static str> {
    let prefix = mac.get(0..8)?.to_ascii_lowercase();
    KNOWN_OUIS
        .iter()
        .find(|(oui, _)| oui.eq_ignore_ascii_case(&prefix))
        .map(|(_, manufacturer)| *manufacturer)
}

pub fn default_credentials(manufacturer: &str) -> DefaultCredentials {
    match manufacturer {
        "Dell" => DefaultCredentials { username: "root", password: "calvin" },
        "HPE" => DefaultCredentials { username: "Administrator", password: "password" },
        "Lenovo" => DefaultCredentials { username: "USERID", password: "PASSW0RD" },
        _ => DefaultCredentials { username: "admin", password: "admin" },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_prefix() {
        assert_eq!(lookup_manufacturer("b8:2a:72:aa:bb:cc"), Some("Dell"));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert_eq!(lookup_manufacturer("ff:ff:ff:aa:bb:cc"), None);
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(lookup_manufacturer("B8:2A:72:AA:BB:CC"), Some("Dell"));
    }
}
