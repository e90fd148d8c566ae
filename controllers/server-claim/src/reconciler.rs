//! ServerClaim binding (§4.5). The selection itself is pure
//! ([`crate::selection`]); this module owns the I/O: reading candidates
//! out of the Server cache, patching the winning server under the
//! process-local bind mutex, and waiting for the informer cache to catch
//! up before releasing it (§5 "the one mutex").

use std::sync::Arc;
use std::time::Duration;

use crds::server::Server;
use crds::server_claim::{ServerClaim, ServerClaimStatus};
use kube::{Api, Resource, ResourceExt};
use store::{patch_merge, patch_status, ObjectCache};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ControllerError;
use crate::selection::{select_candidate, Candidate};

const CACHE_POLL_INTERVAL: Duration = Duration::from_millis(20);
const CACHE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Guards the candidate-select → patch → cache-observe window. One
/// instance per controller process; never shared across instances
/// (§9 "global mutable state").
pub struct BindMutex(Mutex<()>);

impl BindMutex {
    pub fn new() -> Self {
        Self(Mutex::new(()))
    }
}

fn candidates_from_cache<'a>(servers: &'a [Arc<Server>]) -> Vec<Candidate<'a>> {
    servers
        .iter()
        .map(|s| Candidate {
            name: s.meta().name.as_deref().unwrap_or_default(),
            labels: s.labels(),
            state: s.status.as_ref().map(|st| st.state).unwrap_or_default(),
            power_state: s.status.as_ref().map(|st| st.power_state).unwrap_or_default(),
            already_claimed: s.spec.claim_ref.is_some(),
        })
        .collect()
}

/// Binds `claim` to a candidate server. Returns the bound server's name.
pub async fn bind(bind_mutex: &BindMutex, claim: &ServerClaim, server_api: &Api<Server>, server_cache: &ObjectCache<Server>) -> Result<String, ControllerError> {
    let _guard = bind_mutex.0.lock().await;

    let servers = server_cache.state();
    let candidates = candidates_from_cache(&servers);
    let chosen = select_candidate(&claim.spec, &candidates).ok_or(ControllerError::NoCandidate)?;

    debug!(claim = %claim.name_any(), server = %chosen, "binding claim to server");

    let claim_ref = serde_json::json!({
        "name": claim.name_any(),
        "namespace": claim.namespace(),
        "uid": claim.uid(),
    });
    let patched = patch_merge(server_api, &chosen, serde_json::json!({ "spec": { "claimRef": claim_ref } })).await?;
    let written_rv = patched.resource_version();

    wait_for_cache(server_cache, &chosen, written_rv.as_deref()).await?;

    Ok(chosen)
}

async fn wait_for_cache(cache: &ObjectCache<Server>, name: &str, expected_rv: Option<&str>) -> Result<(), ControllerError> {
    let deadline = tokio::time::Instant::now() + CACHE_POLL_TIMEOUT;
    loop {
        let seen = cache.state().into_iter().find(|s| s.meta().name.as_deref() == Some(name)).and_then(|s| s.resource_version());

        if let (Some(seen), Some(expected)) = (&seen, expected_rv) {
            if resource_version_at_least(seen, expected) {
                return Ok(());
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(ControllerError::BindObservationTimeout);
        }
        tokio::time::sleep(CACHE_POLL_INTERVAL).await;
    }
}

/// Kubernetes resource versions are opaque strings but numerically
/// monotonic for etcd-backed clusters; parse as u64 and fall back to
/// string equality for non-numeric schemes.
fn resource_version_at_least(seen: &str, expected: &str) -> bool {
    match (seen.parse::<u64>(), expected.parse::<u64>()) {
        (Ok(seen), Ok(expected)) => seen >= expected,
        _ => seen == expected,
    }
}

pub async fn mark_bound(claim_api: &Api<ServerClaim>, claim: &ServerClaim, server_name: &str, boot_configuration_ref: crds::references::NamespacedRef) -> Result<(), ControllerError> {
    let status = ServerClaimStatus {
        phase: crds::server_claim::ClaimPhase::Bound,
        bound_server_ref: Some(crds::references::ClusterRef::new(server_name)),
        boot_configuration_ref: Some(boot_configuration_ref),
    };
    patch_status(claim_api, &claim.name_any(), serde_json::json!({ "status": status })).await?;
    info!(claim = %claim.name_any(), server = server_name, "claim bound");
    Ok(())
}
