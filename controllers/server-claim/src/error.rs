use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no server matched claim")]
    NoCandidate,

    #[error("timed out waiting for binding write to appear in cache")]
    BindObservationTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Precondition,
    Programmer,
}

impl ControllerError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControllerError::Store(StoreError::Conflict(_)) => ErrorClass::Transient,
            ControllerError::Kube(_) => ErrorClass::Transient,
            ControllerError::Store(_) => ErrorClass::Transient,
            ControllerError::NoCandidate => ErrorClass::Precondition,
            ControllerError::BindObservationTimeout => ErrorClass::Transient,
        }
    }
}
