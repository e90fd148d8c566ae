//! Secondary indices over a cache's current state. Rebuilt from scratch
//! on every lookup rather than maintained incrementally — the caches
//! this project indexes (Servers, ServerMaintenances) stay small enough
//! that a linear scan per reconcile is cheap, and it avoids a second
//! source of truth that could drift from the reflector's.

use std::sync::Arc;

use crds::{Server, ServerMaintenance};

use crate::cache::ObjectCache;

/// Finds the `Server` whose status reports `uuid`, used by the endpoint
/// and BMC-inventory reconcilers to map a discovered system UUID back to
/// its owning object.
pub fn server_by_uuid(cache: &ObjectCache<Server>, uuid: &str) -> Option<Arc<Server>> {
    cache.state().into_iter().find(|server| server.status.as_ref().and_then(|s| s.system_uuid.as_deref()) == Some(uuid))
}

/// Finds all `ServerMaintenance` objects whose spec targets `server_name`,
/// used by the maintenance arbiter (C3) to find competing claims over one
/// server.
pub fn maintenance_by_server_name(cache: &ObjectCache<ServerMaintenance>, server_name: &str) -> Vec<Arc<ServerMaintenance>> {
    cache.state().into_iter().filter(|m| m.spec.server_ref.name == server_name).collect()
}

/// Finds every `Server` behind a given `BMC`, used by the BMC settings
/// reconciler (C7) to fan out one `ServerMaintenance` per server before
/// applying a change to the BMC they share.
pub fn servers_by_bmc_name(cache: &ObjectCache<Server>, bmc_name: &str) -> Vec<Arc<Server>> {
    cache.state().into_iter().filter(|s| s.spec.bmc_ref.name == bmc_name).collect()
}
