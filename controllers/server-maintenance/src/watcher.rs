//! Watch loop over `ServerMaintenance`: resolves the held `Server` and,
//! for `OwnerApproval` policy, the owning `ServerClaim` out of read-
//! through caches, runs the pure arbiter, and applies its verdict.

use std::sync::Arc;
use std::time::Duration;

use crds::maintenance::{MaintenanceState, ServerMaintenance, SERVER_MAINTENANCE_FINALIZER};
use crds::server::Server;
use crds::server_claim::ServerClaim;
use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use maintenance::decide;
use runtime::{KeyedLocks, ResyncTracker};
use store::{ensure_finalizer, find_by_name, remove_finalizer, ObjectCache};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ControllerError;
use crate::reconciler;

/// Resync cadence (§5): the arbiter also depends on the held `Server`'s
/// observed state, which can change without a matching watch event on
/// this `ServerMaintenance`.
const RESYNC_MIN_SECS: u64 = 5;
const RESYNC_MAX_SECS: u64 = 30;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    api: Api<ServerMaintenance>,
    server_api: Api<Server>,
    servers: ObjectCache<Server>,
    claims: ObjectCache<ServerClaim>,
    locks: Arc<KeyedLocks>,
    semaphore: Arc<Semaphore>,
    resync: ResyncTracker,
}

impl Watcher {
    pub fn new(api: Api<ServerMaintenance>, server_api: Api<Server>, servers: ObjectCache<Server>, claims: ObjectCache<ServerClaim>, max_concurrent: usize) -> Self {
        Self {
            api,
            server_api,
            servers,
            claims,
            locks: Arc::new(KeyedLocks::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            resync: ResyncTracker::new(RESYNC_MIN_SECS, RESYNC_MAX_SECS),
        }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting ServerMaintenance watcher");
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
                    self.resync_active().await;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: Result<ServerMaintenance, watcher::Error>) {
        let m = match event {
            Ok(m) => m,
            Err(err) => {
                warn!(error = %err, "maintenance watch stream error");
                return;
            }
        };

        let name = m.name_any();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&name).await;
        self.reconcile_one(&m).await;
    }

    async fn resync_active(&self) {
        let maintenances = match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "maintenance resync list failed");
                return;
            }
        };

        for m in maintenances {
            let name = m.name_any();
            let state = m.status.as_ref().map(|s| s.state).unwrap_or_default();
            let active = m.meta().deletion_timestamp.is_some() || !matches!(state, MaintenanceState::Completed | MaintenanceState::Failed);

            if !active {
                self.resync.clear(&name);
                continue;
            }
            if !self.resync.is_due(&name) {
                continue;
            }

            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&name).await;
            self.reconcile_one(&m).await;
        }
    }

    async fn reconcile_one(&self, m: &ServerMaintenance) {
        let name = m.name_any();

        let server = match find_by_name(&self.servers, &m.spec.server_ref.name) {
            Some(server) => server,
            None => {
                warn!(maintenance = %name, server = %m.spec.server_ref.name, "held server not yet observed, requeuing on next event");
                return;
            }
        };

        let claim = m.spec.owner_ref.as_ref().and_then(|owner_ref| find_by_name(&self.claims, &owner_ref.name));
        let approved = reconciler::is_approved(m, claim.as_deref());
        let input = reconciler::build_input(m, server.as_ref(), approved);
        let action = decide(input);

        if let Err(err) = reconciler::apply_action(action, &self.api, &self.server_api, m, server.as_ref()).await {
            warn!(maintenance = %name, error = %err, class = ?err.classify(), "maintenance reconcile failed");
            return;
        }

        if m.meta().deletion_timestamp.is_some() {
            if let Err(err) = remove_finalizer(&self.api, m, SERVER_MAINTENANCE_FINALIZER).await {
                error!(maintenance = %name, error = %err, "failed to remove maintenance finalizer");
            }
            return;
        }

        if let Err(err) = ensure_finalizer(&self.api, m, SERVER_MAINTENANCE_FINALIZER).await {
            error!(maintenance = %name, error = %err, "failed to set maintenance finalizer");
        }
    }
}
