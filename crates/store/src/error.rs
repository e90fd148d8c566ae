use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("object {0} not found in cache")]
    NotFound(String),

    #[error("optimistic concurrency conflict writing {0}, retry reconcile")]
    Conflict(String),

    #[error("watch stream for {0} closed")]
    WatchClosed(String),
}
