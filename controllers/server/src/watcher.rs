//! Watch loop: one `kube_runtime::watcher` stream over `Server`, a
//! per-key lock before each reconcile, and a semaphore bounding total
//! concurrent reconciles (§5). Builds a fresh device client per pass by
//! resolving the Server's BMC, its endpoint and its secret out of
//! read-through caches.
//!
//! A second stream over `BMC` drives the inventory side of this
//! controller (§3 invariant 2, §4.8): for each BMC it ensures exactly
//! `spec.server_count` `Server` objects exist, named deterministically
//! by `canonical_server_name`, so a BMC is the sole source of truth for
//! how many servers it manages.

use std::sync::Arc;
use std::time::Duration;

use crds::bmc::BMC;
use crds::bmc_secret::BMCSecret;
use crds::endpoint::Endpoint;
use crds::references::ClusterRef;
use crds::server::{canonical_server_name, ServerSpec, ServerState, SERVER_FINALIZER};
use futures::StreamExt;
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use redfish_client::ClientGuard;
use runtime::{KeyedLocks, ResyncTracker};
use store::{ensure_finalizer, find_by_name, patch_status, remove_finalizer, ObjectCache};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ControllerError;
use crate::reconciler;

/// Resync cadence (§5): a `Server` whose `BmcSettings`/secret weren't
/// observed yet at discovery time only gets re-driven by a later edit to
/// the `Server` itself absent a timer, and power/health state drifts on
/// the device independently of any Kubernetes edit.
const RESYNC_MIN_SECS: u64 = 10;
const RESYNC_MAX_SECS: u64 = 60;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    api: Api<crds::server::Server>,
    bmc_api: Api<BMC>,
    bmcs: ObjectCache<BMC>,
    secrets: ObjectCache<BMCSecret>,
    endpoints: ObjectCache<Endpoint>,
    locks: Arc<KeyedLocks>,
    semaphore: Arc<Semaphore>,
    device_timeout: Duration,
    resync: ResyncTracker,
}

impl Watcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Api<crds::server::Server>,
        bmc_api: Api<BMC>,
        bmcs: ObjectCache<BMC>,
        secrets: ObjectCache<BMCSecret>,
        endpoints: ObjectCache<Endpoint>,
        max_concurrent: usize,
        device_timeout: Duration,
    ) -> Self {
        Self {
            api,
            bmc_api,
            bmcs,
            secrets,
            endpoints,
            locks: Arc::new(KeyedLocks::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            device_timeout,
            resync: ResyncTracker::new(RESYNC_MIN_SECS, RESYNC_MAX_SECS),
        }
    }

    /// Watches `BMC` and ensures its server inventory exists. Run
    /// alongside `run()` (see `main.rs`); the two streams are
    /// independent and never contend for the same per-key lock since
    /// inventory keys are prefixed.
    pub async fn run_inventory(&self) -> Result<(), ControllerError> {
        info!("starting BMC inventory watcher");
        let mut stream = Box::pin(watcher::watcher(self.bmc_api.clone(), Config::default()).default_backoff().touched_objects());

        while let Some(event) = stream.next().await {
            let bmc = match event {
                Ok(bmc) => bmc,
                Err(err) => {
                    warn!(error = %err, "bmc inventory watch stream error");
                    continue;
                }
            };

            if bmc.meta().deletion_timestamp.is_some() {
                continue;
            }

            let bmc_name = bmc.name_any();
            let _guard = self.locks.acquire(&format!("inventory/{bmc_name}")).await;

            if let Err(err) = self.reconcile_inventory(&bmc).await {
                warn!(bmc = %bmc_name, error = %err, class = ?err.classify(), "bmc inventory reconcile failed");
            }
        }

        Ok(())
    }

    async fn reconcile_inventory(&self, bmc: &BMC) -> Result<(), ControllerError> {
        let bmc_name = bmc.name_any();
        for index in 0..bmc.spec.server_count {
            let server_name = canonical_server_name(&bmc_name, index);
            let spec = ServerSpec {
                bmc_ref: ClusterRef::new(&bmc_name),
                bmc_index: index,
                claim_ref: None,
                maintenance_ref: None,
                bios_settings_ref: None,
                boot_configuration_ref: None,
                power: None,
            };
            let body = serde_json::json!({
                "apiVersion": "metal.dcops.io/v1alpha1",
                "kind": "Server",
                "metadata": { "name": server_name },
                "spec": spec,
            });
            self.api.patch(&server_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body)).await.map_err(ControllerError::Kube)?;
        }
        info!(bmc = %bmc_name, count = bmc.spec.server_count, "reconciled bmc server inventory");
        Ok(())
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting Server watcher");
        let mut stream = Box::pin(watcher::watcher(self.api.clone(), Config::default()).default_backoff().touched_objects());
        let mut ticker = tokio::time::interval(RESYNC_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = stream.next() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
                _ = ticker.tick() => {
                    self.resync_all().await;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: Result<crds::server::Server, watcher::Error>) {
        let server = match event {
            Ok(server) => server,
            Err(err) => {
                warn!(error = %err, "server watch stream error");
                return;
            }
        };

        let name = server.name_any();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&name).await;

        if server.meta().deletion_timestamp.is_some() {
            self.resync.clear(&name);
            if let Err(err) = remove_finalizer(&self.api, &server, SERVER_FINALIZER).await {
                error!(server = %name, error = %err, "failed to remove server finalizer");
            }
            return;
        }

        if let Err(err) = ensure_finalizer(&self.api, &server, SERVER_FINALIZER).await {
            error!(server = %name, error = %err, "failed to set server finalizer");
            return;
        }

        self.reconcile_one(&server).await;
    }

    /// Periodically re-drives every `Server` that hasn't been reconciled
    /// recently, so a BMC/secret that wasn't observed yet at discovery
    /// time, or a device state drift with no corresponding Kubernetes
    /// edit, still gets picked up.
    async fn resync_all(&self) {
        let servers = match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "server resync list failed");
                return;
            }
        };

        for server in servers {
            let name = server.name_any();
            if server.meta().deletion_timestamp.is_some() || !self.resync.is_due(&name) {
                continue;
            }
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&name).await;
            self.reconcile_one(&server).await;
        }
    }

    async fn reconcile_one(&self, server: &crds::server::Server) {
        let name = server.name_any();

        let bmc = match find_by_name(&self.bmcs, &server.spec.bmc_ref.name) {
            Some(bmc) => bmc,
            None => {
                warn!(server = %name, bmc = %server.spec.bmc_ref.name, "bmc not yet observed, requeuing on next event");
                return;
            }
        };

        let secret = match find_by_name(&self.secrets, &bmc.spec.credentials_ref.name) {
            Some(secret) => secret,
            None => {
                warn!(server = %name, "bmc secret not yet observed, requeuing on next event");
                return;
            }
        };

        let resolved_ip = device_resolver::referenced_endpoint_name(&bmc.spec).and_then(|endpoint_name| find_by_name(&self.endpoints, endpoint_name)).map(|ep| ep.spec.ip.clone());

        let guard = match device_resolver::build_client(&bmc.spec, &secret.spec, resolved_ip.as_deref()) {
            Ok(client) => ClientGuard::new(client, self.device_timeout),
            Err(err) => {
                error!(server = %name, error = %err, "failed to build device client");
                return;
            }
        };

        let discovery_ack = server.annotations().get(crds::ANNOTATION_DISCOVERY_ACK).map(String::as_str) == Some(crds::ANNOTATION_DISCOVERY_ACK_VALUE);

        match reconciler::reconcile(server, guard.client(), self.device_timeout, discovery_ack).await {
            Ok(status) => {
                let state = status.state;
                if let Err(err) = patch_status(&self.api, &name, serde_json::json!({ "status": status })).await {
                    error!(server = %name, error = %err, "failed to patch server status");
                } else if state == ServerState::Error {
                    warn!(server = %name, "server entered Error state");
                }
            }
            Err(err) => {
                warn!(server = %name, error = %err, class = ?err.classify(), "server reconcile failed");
            }
        }
    }
}
