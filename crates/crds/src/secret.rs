//! Double-base64 credential decoding convention, §6.
//!
//! The object store encodes secret fields in base64 once; this project's
//! own convention encodes them a second time on top of that before they
//! ever reach a `BMCSecret` spec. Both layers are decoded here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("field is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("decoded field is not valid UTF-8")]
    InvalidUtf8,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

pub fn decode_credential(field_name: &'static str, value: &str) -> Result<String, SecretError> {
    if value.is_empty() {
        return Err(SecretError::MissingField(field_name));
    }
    let once = STANDARD
        .decode(value)
        .map_err(|e| SecretError::InvalidBase64(e.to_string()))?;
    let twice = STANDARD
        .decode(&once)
        .map_err(|e| SecretError::InvalidBase64(e.to_string()))?;
    String::from_utf8(twice).map_err(|_| SecretError::InvalidUtf8)
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub fn decode_bmc_secret(spec: &crate::bmc_secret::BmcSecretSpec) -> Result<Credentials, SecretError> {
    Ok(Credentials {
        username: decode_credential("username", &spec.username)?,
        password: decode_credential("password", &spec.password)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_encode(value: &str) -> String {
        STANDARD.encode(STANDARD.encode(value))
    }

    #[test]
    fn round_trips_double_encoding() {
        let encoded = double_encode("hunter2");
        assert_eq!(decode_credential("password", &encoded).unwrap(), "hunter2");
    }

    #[test]
    fn rejects_missing_field() {
        assert_eq!(decode_credential("username", ""), Err(SecretError::MissingField("username")));
    }

    #[test]
    fn rejects_single_encoded_value() {
        // Single-encoded (the store's own layer only) decodes successfully as
        // base64 but the second decode of plain ASCII text fails.
        let once = STANDARD.encode("hunter2");
        assert!(decode_credential("password", &once).is_err());
    }
}
