//! Watch loop over `BIOSVersion`: acquires a `ServerMaintenance` hold,
//! then drives the checkpoint sequence once the arbiter grants it, and
//! releases the hold by deleting the maintenance object on completion
//! (which the maintenance controller treats as a normal release, §4.3).

use std::sync::Arc;
use std::time::Duration;

use crds::bios_version::{BiosVersionState, ANNOTATION_OPERATION, BIOS_VERSION_FINALIZER, OPERATION_RETRY, OPERATION_RETRY_FAILED};
use crds::bmc::BMC;
use crds::bmc_secret::BMCSecret;
use crds::endpoint::Endpoint;
use crds::maintenance::{MaintenanceState, ServerMaintenance, ServerMaintenanceSpec};
use crds::references::{ClusterRef, NamespacedRef};
use crds::server::Server;
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
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

/// Poll-task resync cadence (§5): an `InProgress` upgrade whose last
/// checkpoint is `PollTask` only advances when something re-drives its
/// reconcile, and a device firmware task can run for minutes without
/// producing a Kubernetes watch event on its own.
const RESYNC_MIN_SECS: u64 = 5;
const RESYNC_MAX_SECS: u64 = 30;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    api: Api<crds::bios_version::BIOSVersion>,
    maintenance_api: Api<ServerMaintenance>,
    servers: ObjectCache<Server>,
    maintenances: ObjectCache<ServerMaintenance>,
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
        api: Api<crds::bios_version::BIOSVersion>,
        maintenance_api: Api<ServerMaintenance>,
        servers: ObjectCache<Server>,
        maintenances: ObjectCache<ServerMaintenance>,
        bmcs: ObjectCache<BMC>,
        secrets: ObjectCache<BMCSecret>,
        endpoints: ObjectCache<Endpoint>,
        max_concurrent: usize,
        device_timeout: Duration,
    ) -> Self {
        Self {
            api,
            maintenance_api,
            servers,
            maintenances,
            bmcs,
            secrets,
            endpoints,
            locks: Arc::new(KeyedLocks::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            device_timeout,
            resync: ResyncTracker::new(RESYNC_MIN_SECS, RESYNC_MAX_SECS),
        }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting BIOSVersion watcher");
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
                    self.resync_in_progress().await;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: Result<crds::bios_version::BIOSVersion, watcher::Error>) {
        let upgrade = match event {
            Ok(upgrade) => upgrade,
            Err(err) => {
                warn!(error = %err, "bios-version watch stream error");
                return;
            }
        };

        let name = upgrade.name_any();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&name).await;

        if upgrade.meta().deletion_timestamp.is_some() {
            self.resync.clear(&name);
            if let Err(err) = remove_finalizer(&self.api, &upgrade, BIOS_VERSION_FINALIZER).await {
                error!(upgrade = %name, error = %err, "failed to remove bios-version finalizer");
            }
            return;
        }

        if let Err(err) = ensure_finalizer(&self.api, &upgrade, BIOS_VERSION_FINALIZER).await {
            error!(upgrade = %name, error = %err, "failed to set bios-version finalizer");
            return;
        }

        if let Err(err) = self.reconcile_one(&upgrade).await {
            warn!(upgrade = %name, error = %err, class = ?err.classify(), "bios-version reconcile failed");
        }
    }

    /// Re-drives every `InProgress` upgrade whose resync backoff has
    /// elapsed, so a stalled task poll makes progress without waiting
    /// for an unrelated external edit to the object.
    async fn resync_in_progress(&self) {
        let upgrades = match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "bios-version resync list failed");
                return;
            }
        };

        for upgrade in upgrades {
            let name = upgrade.name_any();
            let in_progress = upgrade.status.as_ref().map(|s| s.state).unwrap_or_default() == BiosVersionState::InProgress;

            if !in_progress {
                self.resync.clear(&name);
                continue;
            }
            if !self.resync.is_due(&name) {
                continue;
            }

            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&name).await;
            if let Err(err) = self.reconcile_one(&upgrade).await {
                warn!(upgrade = %name, error = %err, class = ?err.classify(), "bios-version resync reconcile failed");
            }
        }
    }

    async fn reconcile_one(&self, upgrade: &crds::bios_version::BIOSVersion) -> Result<(), ControllerError> {
        let name = upgrade.name_any();
        let mut status = upgrade.status.clone().unwrap_or_default();

        if status.state == BiosVersionState::Failed {
            match upgrade.annotations().get(ANNOTATION_OPERATION).map(String::as_str) {
                Some(OPERATION_RETRY) => {
                    status = Default::default();
                }
                Some(OPERATION_RETRY_FAILED) => {
                    if status.conditions.last().map(|c| c.type_.as_str()) == Some("Failed") {
                        status.conditions.pop();
                    }
                    status.state = BiosVersionState::InProgress;
                }
                _ => {
                    return Ok(());
                }
            }
        }

        if status.state == BiosVersionState::Completed {
            return Ok(());
        }

        let server = find_by_name(&self.servers, &upgrade.spec.server_ref.name).ok_or_else(|| ControllerError::ServerNotFound(upgrade.spec.server_ref.name.clone()))?;

        // Before taking a maintenance hold, check whether the device is
        // already at the desired version (§8 scenario 1) or the request
        // is a downgrade/unorderable (§8 scenario 4) — neither case ever
        // needs a task or a hold.
        if status.state == BiosVersionState::Pending {
            if let Some(guard) = self.resolve_guard(&server).await {
                let uri = redfish_client::system_uri(server.spec.bmc_index);
                if let Ok(current) = guard.client().get_bios_version(&uri, self.device_timeout).await {
                    if let Some(terminal) = reconciler::precheck_version(&current, &upgrade.spec.version) {
                        status.state = terminal;
                        patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                        return Ok(());
                    }
                }
            }
        }

        let maintenance_name = upgrade.spec.maintenance_ref.as_ref().map_or_else(|| format!("{name}-upgrade"), |r| r.name.clone());
        status.maintenance_ref = Some(NamespacedRef::new(&maintenance_name));

        let maintenance = match find_by_name(&self.maintenances, &maintenance_name) {
            Some(m) => m,
            None => {
                self.ensure_maintenance(&maintenance_name, upgrade).await?;
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                return Ok(());
            }
        };

        let granted = server.spec.maintenance_ref.as_ref().map(|r| r.name == maintenance_name).unwrap_or(false)
            && maintenance.status.as_ref().map(|s| s.state).unwrap_or_default() == MaintenanceState::InMaintenance;

        if !granted {
            patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
            return Ok(());
        }

        if status.state == BiosVersionState::Pending {
            status.state = BiosVersionState::InProgress;
        }

        let guard = match self.resolve_guard(&server).await {
            Some(guard) => guard,
            None => {
                warn!(upgrade = %name, "bmc, credentials, or device client not yet available, requeuing on next event");
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                return Ok(());
            }
        };

        match reconciler::reconcile(&status, &server, &upgrade.spec.version, &upgrade.spec.image, guard.client(), self.device_timeout).await {
            Ok(next_status) => {
                let completed = next_status.state == BiosVersionState::Completed;
                patch_status(&self.api, &name, serde_json::json!({ "status": next_status })).await?;
                if completed {
                    let _ = self.maintenance_api.delete(&maintenance_name, &DeleteParams::default()).await;
                }
                Ok(())
            }
            Err(ControllerError::TaskFailed(_, _)) => {
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Resolves `server`'s BMC and credentials out of the read-through
    /// caches and builds a guarded device client. `None` covers both
    /// "not cached yet" and "client construction failed" — both cases
    /// the caller just tries again on the next pass.
    async fn resolve_guard(&self, server: &Server) -> Option<ClientGuard> {
        let bmc = find_by_name(&self.bmcs, &server.spec.bmc_ref.name)?;
        let secret = find_by_name(&self.secrets, &bmc.spec.credentials_ref.name)?;
        let resolved_ip = device_resolver::referenced_endpoint_name(&bmc.spec).and_then(|endpoint_name| find_by_name(&self.endpoints, endpoint_name)).map(|ep| ep.spec.ip.clone());
        match device_resolver::build_client(&bmc.spec, &secret.spec, resolved_ip.as_deref()) {
            Ok(client) => Some(ClientGuard::new(client, self.device_timeout)),
            Err(err) => {
                error!(server = %server.name_any(), error = %err, "failed to build device client");
                None
            }
        }
    }

    async fn ensure_maintenance(&self, maintenance_name: &str, upgrade: &crds::bios_version::BIOSVersion) -> Result<(), ControllerError> {
        let body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "ServerMaintenance",
            "metadata": { "name": maintenance_name, "namespace": upgrade.namespace() },
            "spec": ServerMaintenanceSpec {
                server_ref: ClusterRef::new(&upgrade.spec.server_ref.name),
                policy: upgrade.spec.maintenance_policy,
                owner_ref: None,
                desired_power: None,
            },
        });
        self.maintenance_api
            .patch(maintenance_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body))
            .await
            .map_err(ControllerError::Kube)?;
        info!(upgrade = %upgrade.name_any(), maintenance = maintenance_name, "created maintenance hold for bios upgrade");
        Ok(())
    }
}
