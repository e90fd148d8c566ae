use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("mac address {0} does not match a known BMC vendor prefix")]
    UnrecognizedVendor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Precondition,
}

impl ControllerError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Store(_) => ErrorClass::Transient,
            ControllerError::UnrecognizedVendor(_) => ErrorClass::Precondition,
        }
    }
}
