//! Watch loop for `ServerClaim` (§4.5). Binding happens under the
//! process-local mutex in [`crate::reconciler`]; this module wires the
//! watch events, the finalizer, boot-configuration materialization, and
//! deletion reversal around it.

use std::sync::Arc;
use std::time::Duration;

use crds::boot_configuration::{ServerBootConfiguration, ServerBootConfigurationSpec};
use crds::references::{ClusterRef, NamespacedRef};
use crds::server::Server;
use crds::server_claim::{ClaimPhase, ServerClaim, SERVER_CLAIM_FINALIZER};
use futures::StreamExt;
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use runtime::{KeyedLocks, ResyncTracker};
use store::{ensure_finalizer, patch_merge, remove_finalizer, ObjectCache};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ControllerError;
use crate::reconciler::{self, BindMutex};

/// Resync cadence (§5): a claim that finds `NoCandidate` stays unbound
/// until some server frees up, and nothing about that freeing touches
/// the claim itself, so a timer is what actually retries the bind.
const RESYNC_MIN_SECS: u64 = 5;
const RESYNC_MAX_SECS: u64 = 30;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    claim_api: Api<ServerClaim>,
    server_api: Api<Server>,
    boot_api: Api<ServerBootConfiguration>,
    server_cache: ObjectCache<Server>,
    bind_mutex: Arc<BindMutex>,
    locks: Arc<KeyedLocks>,
    semaphore: Arc<Semaphore>,
    resync: ResyncTracker,
}

impl Watcher {
    pub fn new(claim_api: Api<ServerClaim>, server_api: Api<Server>, boot_api: Api<ServerBootConfiguration>, server_cache: ObjectCache<Server>, max_concurrent: usize) -> Self {
        Self {
            claim_api,
            server_api,
            boot_api,
            server_cache,
            bind_mutex: Arc::new(BindMutex::new()),
            locks: Arc::new(KeyedLocks::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            resync: ResyncTracker::new(RESYNC_MIN_SECS, RESYNC_MAX_SECS),
        }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting ServerClaim watcher");
        let mut stream = Box::pin(watcher::watcher(self.claim_api.clone(), Config::default()).default_backoff().touched_objects());
        let mut ticker = tokio::time::interval(RESYNC_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = stream.next() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
                _ = ticker.tick() => {
                    self.resync_unbound().await;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: Result<ServerClaim, watcher::Error>) {
        let claim = match event {
            Ok(claim) => claim,
            Err(err) => {
                warn!(error = %err, "claim watch stream error");
                return;
            }
        };

        let key = format!("{}/{}", claim.namespace().unwrap_or_default(), claim.name_any());
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&key).await;

        if claim.meta().deletion_timestamp.is_some() {
            self.resync.clear(&key);
        }

        if let Err(err) = self.reconcile_one(&claim).await {
            warn!(claim = %key, error = %err, class = ?err.classify(), "claim reconcile failed");
        }
    }

    async fn resync_unbound(&self) {
        let claims = match self.claim_api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "claim resync list failed");
                return;
            }
        };

        for claim in claims {
            let key = format!("{}/{}", claim.namespace().unwrap_or_default(), claim.name_any());
            let bound = claim.meta().deletion_timestamp.is_none() && claim.status.as_ref().map(|s| s.phase).unwrap_or_default() == ClaimPhase::Bound;

            if bound {
                self.resync.clear(&key);
                continue;
            }
            if !self.resync.is_due(&key) {
                continue;
            }

            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&key).await;
            if let Err(err) = self.reconcile_one(&claim).await {
                warn!(claim = %key, error = %err, class = ?err.classify(), "claim resync reconcile failed");
            }
        }
    }

    async fn reconcile_one(&self, claim: &ServerClaim) -> Result<(), ControllerError> {
        let name = claim.name_any();

        if claim.meta().deletion_timestamp.is_some() {
            return self.release(claim).await;
        }

        ensure_finalizer(&self.claim_api, claim, SERVER_CLAIM_FINALIZER).await?;

        let phase = claim.status.as_ref().map(|s| s.phase).unwrap_or_default();
        if phase == ClaimPhase::Bound {
            return Ok(());
        }

        let server_name = reconciler::bind(&self.bind_mutex, claim, &self.server_api, &self.server_cache).await?;

        let ignition_ref = &claim.spec.boot.ignition_secret_ref;
        let boot_spec = ServerBootConfigurationSpec {
            server_ref: ClusterRef::new(&server_name),
            image: claim.spec.boot.image.clone(),
            ignition_secret_ref: ignition_ref.clone(),
        };
        self.ensure_boot_configuration(&name, claim.namespace().as_deref(), &boot_spec).await?;

        let boot_ref = NamespacedRef { name: name.clone(), namespace: claim.namespace(), uid: None };
        reconciler::mark_bound(&self.claim_api, claim, &server_name, boot_ref).await?;

        patch_merge(&self.server_api, &server_name, serde_json::json!({ "spec": { "power": claim.spec.power } })).await?;

        Ok(())
    }

    async fn ensure_boot_configuration(&self, name: &str, namespace: Option<&str>, spec: &ServerBootConfigurationSpec) -> Result<(), ControllerError> {
        let body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "ServerBootConfiguration",
            "metadata": { "name": name, "namespace": namespace },
            "spec": spec,
        });
        self.boot_api
            .patch(name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body))
            .await
            .map_err(ControllerError::Kube)?;
        Ok(())
    }

    async fn release(&self, claim: &ServerClaim) -> Result<(), ControllerError> {
        let name = claim.name_any();

        if let Some(server_ref) = claim.status.as_ref().and_then(|s| s.bound_server_ref.as_ref()) {
            patch_merge(
                &self.server_api,
                &server_ref.name,
                serde_json::json!({ "spec": { "power": crds::power::DesiredPower::Off, "claimRef": serde_json::Value::Null, "bootConfigurationRef": serde_json::Value::Null } }),
            )
            .await?;
        }

        if self.boot_api.get_opt(&name).await.map_err(ControllerError::Kube)?.is_some() {
            if let Err(err) = self.boot_api.delete(&name, &Default::default()).await {
                error!(claim = %name, error = %err, "failed to delete boot configuration during claim release");
            }
        }

        remove_finalizer(&self.claim_api, claim, SERVER_CLAIM_FINALIZER).await?;
        info!(claim = %name, "claim released");
        Ok(())
    }
}
