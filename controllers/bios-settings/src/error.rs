use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Redfish(#[from] redfish_client::RedfishError),

    #[error("server {0} referenced by settings not found")]
    ServerNotFound(String),

    #[error("desired attributes did not type-match the device: {0}")]
    TypeMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Precondition,
    ObjectFailure,
}

impl ControllerError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Store(_) => ErrorClass::Transient,
            ControllerError::Redfish(err) if err.is_retryable() => ErrorClass::Transient,
            ControllerError::Redfish(_) => ErrorClass::ObjectFailure,
            ControllerError::ServerNotFound(_) => ErrorClass::Precondition,
            ControllerError::TypeMismatch(_) => ErrorClass::ObjectFailure,
        }
    }
}
