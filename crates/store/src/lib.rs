//! Object store adapter (C2): watched read caches plus optimistic-
//! concurrency writes, shared by every controller in the workspace so
//! none of them talk to the API server directly for reads.

pub mod cache;
pub mod error;
pub mod index;
pub mod writer;

pub use cache::{find_by_name, get_or_not_found, ObjectCache};
pub use error::StoreError;
pub use writer::{ensure_finalizer, patch_merge, patch_status, remove_finalizer};
