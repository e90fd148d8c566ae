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

    #[error("server {0} referenced by upgrade not found")]
    ServerNotFound(String),

    #[error("firmware task {0} reported failure: {1}")]
    TaskFailed(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Precondition,
    DeviceReportedFailure,
}

impl ControllerError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Store(_) => ErrorClass::Transient,
            ControllerError::Redfish(err) if err.is_retryable() => ErrorClass::Transient,
            ControllerError::Redfish(_) => ErrorClass::DeviceReportedFailure,
            ControllerError::ServerNotFound(_) => ErrorClass::Precondition,
            ControllerError::TaskFailed(_, _) => ErrorClass::DeviceReportedFailure,
        }
    }
}
