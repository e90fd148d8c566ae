//! Error taxonomy for the Server reconciler, expressed as a `classify`
//! method so the watch loop can decide backoff vs. terminal-Failed vs.
//! silent requeue uniformly (§7).

use redfish_client::RedfishError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("redfish device error: {0}")]
    Redfish(#[from] RedfishError),

    #[error("bmc {0} has no known credentials")]
    MissingCredentials(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Precondition,
    ObjectFailure,
    Programmer,
}

impl ControllerError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControllerError::Store(StoreError::Conflict(_)) => ErrorClass::Transient,
            ControllerError::Redfish(RedfishError::Transient(_)) => ErrorClass::Transient,
            ControllerError::Redfish(RedfishError::Timeout) => ErrorClass::Transient,
            ControllerError::Redfish(RedfishError::NotSupported(_)) => ErrorClass::ObjectFailure,
            ControllerError::Redfish(RedfishError::Unauthenticated(_)) => ErrorClass::Transient,
            ControllerError::Redfish(RedfishError::Protocol(_)) => ErrorClass::ObjectFailure,
            ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Store(_) => ErrorClass::Transient,
            ControllerError::MissingCredentials(_) => ErrorClass::Programmer,
            ControllerError::Config(_) => ErrorClass::Programmer,
        }
    }
}
