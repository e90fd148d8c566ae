//! Watch loop over `BMCSettings`: acquires the BMC-level lock, fans out
//! one `ServerMaintenance` per server behind the BMC, waits for all of
//! them before writing a single attribute, and tears the whole hold set
//! down (in reverse) once applied or aborted.

use std::sync::Arc;
use std::time::Duration;

use crds::bmc::BMC;
use crds::bmc_secret::BMCSecret;
use crds::endpoint::Endpoint;
use crds::maintenance::{BmcMaintenanceSpec, BmcMaintenanceStatus, MaintenanceState, ServerMaintenanceSpec, BMCMaintenance, ServerMaintenance};
use crds::references::{ClusterRef, NamespacedRef};
use crds::server::Server;
use crds::server_claim::ANNOTATION_MAINTENANCE_APPROVED;
use crds::settings::{SettingsState, BMCSettings, BMC_SETTINGS_FINALIZER};
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use maintenance::{decide, ArbiterAction};
use redfish_client::ClientGuard;
use runtime::{KeyedLocks, ResyncTracker};
use store::index::servers_by_bmc_name;
use store::{ensure_finalizer, find_by_name, patch_status, remove_finalizer, ObjectCache};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ControllerError;
use crate::reconciler::{self, AllocationPlan};

/// Resync cadence (§5): the multi-server hold fan-out and the device
/// settings poll both depend on state this watcher does not itself
/// receive watch events for (other objects' maintenance status, the
/// device's own reported version), so a stalled wait needs a timer to
/// make progress.
const RESYNC_MIN_SECS: u64 = 5;
const RESYNC_MAX_SECS: u64 = 30;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    api: Api<BMCSettings>,
    bmc_maintenance_api: Api<BMCMaintenance>,
    server_maintenance_api: Api<ServerMaintenance>,
    bmcs: ObjectCache<BMC>,
    bmc_maintenances: ObjectCache<BMCMaintenance>,
    server_maintenances: ObjectCache<ServerMaintenance>,
    servers: ObjectCache<Server>,
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
        api: Api<BMCSettings>,
        bmc_maintenance_api: Api<BMCMaintenance>,
        server_maintenance_api: Api<ServerMaintenance>,
        bmcs: ObjectCache<BMC>,
        bmc_maintenances: ObjectCache<BMCMaintenance>,
        server_maintenances: ObjectCache<ServerMaintenance>,
        servers: ObjectCache<Server>,
        secrets: ObjectCache<BMCSecret>,
        endpoints: ObjectCache<Endpoint>,
        max_concurrent: usize,
        device_timeout: Duration,
    ) -> Self {
        Self {
            api,
            bmc_maintenance_api,
            server_maintenance_api,
            bmcs,
            bmc_maintenances,
            server_maintenances,
            servers,
            secrets,
            endpoints,
            locks: Arc::new(KeyedLocks::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            device_timeout,
            resync: ResyncTracker::new(RESYNC_MIN_SECS, RESYNC_MAX_SECS),
        }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting BMCSettings watcher");
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
                    self.resync_pending().await;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event: Result<BMCSettings, watcher::Error>) {
        let settings = match event {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "bmc-settings watch stream error");
                return;
            }
        };

        let name = settings.name_any();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&name).await;

        if settings.meta().deletion_timestamp.is_some() {
            self.resync.clear(&name);
            self.abort_all(&settings).await;
            if let Err(err) = remove_finalizer(&self.api, &settings, BMC_SETTINGS_FINALIZER).await {
                error!(settings = %name, error = %err, "failed to remove bmc-settings finalizer");
            }
            return;
        }

        if let Err(err) = ensure_finalizer(&self.api, &settings, BMC_SETTINGS_FINALIZER).await {
            error!(settings = %name, error = %err, "failed to set bmc-settings finalizer");
            return;
        }

        if let Err(err) = self.reconcile_one(&settings).await {
            warn!(settings = %name, error = %err, class = ?err.classify(), "bmc-settings reconcile failed");
        }
    }

    async fn resync_pending(&self) {
        let all = match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "bmc-settings resync list failed");
                return;
            }
        };

        for settings in all {
            let name = settings.name_any();
            let pending = !matches!(settings.status.as_ref().map(|s| s.state).unwrap_or_default(), SettingsState::Applied | SettingsState::Failed);

            if !pending {
                self.resync.clear(&name);
                continue;
            }
            if !self.resync.is_due(&name) {
                continue;
            }

            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&name).await;
            if let Err(err) = self.reconcile_one(&settings).await {
                warn!(settings = %name, error = %err, class = ?err.classify(), "bmc-settings resync reconcile failed");
            }
        }
    }

    async fn reconcile_one(&self, settings: &BMCSettings) -> Result<(), ControllerError> {
        let name = settings.name_any();
        let mut status = settings.status.clone().unwrap_or_default();

        if status.state == SettingsState::Applied || status.state == SettingsState::Failed {
            return Ok(());
        }

        let bmc = find_by_name(&self.bmcs, &settings.spec.bmc_ref.name).ok_or_else(|| ControllerError::BmcNotFound(settings.spec.bmc_ref.name.clone()))?;

        let bmc_maintenance_name = format!("{name}-bmc-lock");
        if !self.ensure_bmc_hold(&bmc_maintenance_name, settings, &mut status).await? {
            patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
            return Ok(());
        }

        let servers = servers_by_bmc_name(&self.servers, &settings.spec.bmc_ref.name);
        let server_names: Vec<String> = servers.iter().map(|s| s.name_any()).collect();
        let maintenance_names: Vec<String> = server_names.iter().map(|n| format!("{name}-{n}")).collect();

        let observed: Vec<Option<MaintenanceState>> =
            maintenance_names.iter().map(|mn| find_by_name(&self.server_maintenances, mn).and_then(|m| m.status.as_ref().map(|s| s.state))).collect();

        if observed.is_empty() {
            // No servers behind this BMC observed yet; nothing to fan out to.
            patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
            return Ok(());
        }

        match reconciler::evaluate_allocation(&observed) {
            AllocationPlan::WaitForAll => {
                for (server, maintenance_name) in servers.iter().zip(maintenance_names.iter()) {
                    if find_by_name(&self.server_maintenances, maintenance_name).is_none() {
                        self.ensure_server_hold(maintenance_name, server, settings).await?;
                    }
                }
                status.maintenance_refs = maintenance_names.iter().cloned().map(NamespacedRef::new).collect();
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
            }
            AllocationPlan::Abort => {
                warn!(settings = %name, "a granted server hold was lost before the set completed, aborting");
                self.release_server_holds(&maintenance_names).await;
                status.maintenance_refs.clear();
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
            }
            AllocationPlan::AllGranted => {
                let secret = find_by_name(&self.secrets, &bmc.spec.credentials_ref.name);
                let secret = match secret {
                    Some(secret) => secret,
                    None => {
                        warn!(settings = %name, "bmc credentials not yet observed, requeuing on next event");
                        patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                        return Ok(());
                    }
                };

                let resolved_ip = device_resolver::referenced_endpoint_name(&bmc.spec).and_then(|endpoint_name| find_by_name(&self.endpoints, endpoint_name)).map(|ep| ep.spec.ip.clone());
                let guard = match device_resolver::build_client(&bmc.spec, &secret.spec, resolved_ip.as_deref()) {
                    Ok(client) => ClientGuard::new(client, self.device_timeout),
                    Err(err) => {
                        error!(settings = %name, error = %err, "failed to build device client");
                        return Ok(());
                    }
                };

                match reconciler::reconcile(&settings.spec.bmc_ref.name, &settings.spec.attributes, &settings.spec.version, guard.client(), self.device_timeout).await {
                    Ok(state) => {
                        if state == SettingsState::Applied {
                            status.state = SettingsState::Applied;
                            self.release_server_holds(&maintenance_names).await;
                            self.release_bmc_hold(&bmc_maintenance_name).await;
                            status.maintenance_refs.clear();
                            status.bmc_maintenance_ref = None;
                        } else {
                            status.state = state;
                        }
                        patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                        Ok(())
                    }
                    Err(err) => {
                        if err.classify() == crate::error::ErrorClass::ObjectFailure {
                            match reconciler::next_retry_budget(status.auto_retry_count_remaining, settings.spec.failed_auto_retry_count) {
                                Some(next) => status.auto_retry_count_remaining = Some(next),
                                None => status.state = SettingsState::Failed,
                            }
                            patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                            return Ok(());
                        }
                        Err(err)
                    }
                }?;
            }
        }

        Ok(())
    }

    /// Returns true once the BMC-level lock is granted and safe to
    /// proceed past; false means the caller should persist `status` and
    /// wait for the next event.
    async fn ensure_bmc_hold(&self, maintenance_name: &str, settings: &BMCSettings, status: &mut crds::settings::BmcSettingsStatus) -> Result<bool, ControllerError> {
        status.bmc_maintenance_ref = Some(ClusterRef::new(maintenance_name));

        let maintenance = match find_by_name(&self.bmc_maintenances, maintenance_name) {
            Some(m) => m,
            None => {
                let body = serde_json::json!({
                    "apiVersion": "metal.dcops.io/v1alpha1",
                    "kind": "BMCMaintenance",
                    "metadata": { "name": maintenance_name },
                    "spec": BmcMaintenanceSpec { bmc_ref: ClusterRef::new(&settings.spec.bmc_ref.name), policy: settings.spec.maintenance_policy, owner_ref: None },
                });
                self.bmc_maintenance_api.patch(maintenance_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body)).await.map_err(ControllerError::Kube)?;
                info!(settings = %settings.name_any(), maintenance = maintenance_name, "created bmc-level maintenance lock");
                return Ok(false);
            }
        };

        let state = maintenance.status.as_ref().map(|s| s.state).unwrap_or_default();
        let approved = maintenance.annotations().get(ANNOTATION_MAINTENANCE_APPROVED).map(String::as_str) == Some("true");
        let input = reconciler::bmc_maintenance_input(settings.spec.maintenance_policy, state, approved, maintenance.meta().deletion_timestamp.is_some());

        match decide(input) {
            ArbiterAction::Grant => {
                patch_status(&self.bmc_maintenance_api, maintenance_name, serde_json::json!({ "status": BmcMaintenanceStatus { state: MaintenanceState::InMaintenance } })).await?;
                Ok(false)
            }
            ArbiterAction::NoOp if state == MaintenanceState::InMaintenance => Ok(true),
            _ => Ok(false),
        }
    }

    async fn ensure_server_hold(&self, maintenance_name: &str, server: &Server, settings: &BMCSettings) -> Result<(), ControllerError> {
        let body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "ServerMaintenance",
            "metadata": { "name": maintenance_name, "namespace": settings.namespace() },
            "spec": ServerMaintenanceSpec { server_ref: ClusterRef::new(&server.name_any()), policy: settings.spec.maintenance_policy, owner_ref: None, desired_power: None },
        });
        self.server_maintenance_api.patch(maintenance_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body)).await.map_err(ControllerError::Kube)?;
        info!(settings = %settings.name_any(), maintenance = maintenance_name, "created per-server maintenance hold");
        Ok(())
    }

    async fn release_server_holds(&self, maintenance_names: &[String]) {
        for maintenance_name in maintenance_names {
            let _ = self.server_maintenance_api.delete(maintenance_name, &DeleteParams::default()).await;
        }
    }

    async fn release_bmc_hold(&self, maintenance_name: &str) {
        let _ = self.bmc_maintenance_api.delete(maintenance_name, &DeleteParams::default()).await;
    }

    async fn abort_all(&self, settings: &BMCSettings) {
        let name = settings.name_any();
        if let Some(status) = &settings.status {
            let maintenance_names: Vec<String> = status.maintenance_refs.iter().map(|r| r.name.clone()).collect();
            self.release_server_holds(&maintenance_names).await;
            if let Some(bmc_ref) = &status.bmc_maintenance_ref {
                self.release_bmc_hold(&bmc_ref.name).await;
            }
        } else {
            let bmc_maintenance_name = format!("{name}-bmc-lock");
            self.release_bmc_hold(&bmc_maintenance_name).await;
        }
    }
}
