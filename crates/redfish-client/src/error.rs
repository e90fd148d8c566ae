//! Error taxonomy for C1, distinguished by how a reconciler should react
//! (§4.1 / §7): transient errors get retried with backoff, unauthenticated
//! errors trigger a credential refresh, not-supported errors are fatal
//! for this device, protocol errors mean the response couldn't be parsed.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RedfishError {
    #[error("transient device error: {0}")]
    Transient(String),

    #[error("authentication failed or session expired: {0}")]
    Unauthenticated(String),

    #[error("operation not supported by this device: {0}")]
    NotSupported(String),

    #[error("malformed response from device: {0}")]
    Protocol(String),

    #[error("device client timed out")]
    Timeout,
}

impl RedfishError {
    /// True if the failure is worth retrying without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RedfishError::Transient(_) | RedfishError::Timeout)
    }
}

impl From<reqwest::Error> for RedfishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RedfishError::Timeout
        } else if err.status().map(|s| s.as_u16()) == Some(401) {
            RedfishError::Unauthenticated(err.to_string())
        } else if err.is_connect() || err.is_request() {
            RedfishError::Transient(err.to_string())
        } else {
            RedfishError::Protocol(err.to_string())
        }
    }
}
