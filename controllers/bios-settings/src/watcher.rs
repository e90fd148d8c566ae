//! Watch loop over `BIOSSettings`: acquires a `ServerMaintenance` hold,
//! then re-diffs the device against the desired attributes every pass
//! until they match, releasing the hold once applied.

use std::sync::Arc;
use std::time::Duration;

use crds::bmc::BMC;
use crds::bmc_secret::BMCSecret;
use crds::endpoint::Endpoint;
use crds::maintenance::{MaintenanceState, ServerMaintenance, ServerMaintenanceSpec};
use crds::references::{ClusterRef, NamespacedRef};
use crds::server::Server;
use crds::settings::{BIOSSettings, SettingsState, BIOS_SETTINGS_FINALIZER};
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

const RESYNC_MIN_SECS: u64 = 5;
const RESYNC_MAX_SECS: u64 = 30;
const RESYNC_TICK: Duration = Duration::from_secs(RESYNC_MIN_SECS);

pub struct Watcher {
    api: Api<BIOSSettings>,
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
        api: Api<BIOSSettings>,
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
        info!("starting BIOSSettings watcher");
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

    async fn handle_event(&self, event: Result<BIOSSettings, watcher::Error>) {
        let settings = match event {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "bios-settings watch stream error");
                return;
            }
        };

        let name = settings.name_any();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let _guard = self.locks.acquire(&name).await;

        if settings.meta().deletion_timestamp.is_some() {
            self.resync.clear(&name);
            if let Err(err) = remove_finalizer(&self.api, &settings, BIOS_SETTINGS_FINALIZER).await {
                error!(settings = %name, error = %err, "failed to remove bios-settings finalizer");
            }
            return;
        }

        if let Err(err) = ensure_finalizer(&self.api, &settings, BIOS_SETTINGS_FINALIZER).await {
            error!(settings = %name, error = %err, "failed to set bios-settings finalizer");
            return;
        }

        if let Err(err) = self.reconcile_one(&settings).await {
            warn!(settings = %name, error = %err, class = ?err.classify(), "bios-settings reconcile failed");
        }
    }

    async fn resync_in_progress(&self) {
        let all = match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!(error = %err, "bios-settings resync list failed");
                return;
            }
        };

        for settings in all {
            let name = settings.name_any();
            let pending = matches!(settings.status.as_ref().map(|s| s.state).unwrap_or_default(), SettingsState::InProgress | SettingsState::AwaitingVersionUpgrade);

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
                warn!(settings = %name, error = %err, class = ?err.classify(), "bios-settings resync reconcile failed");
            }
        }
    }

    async fn reconcile_one(&self, settings: &BIOSSettings) -> Result<(), ControllerError> {
        let name = settings.name_any();
        let mut status = settings.status.clone().unwrap_or_default();

        if status.state == SettingsState::Applied || status.state == SettingsState::Failed {
            return Ok(());
        }

        let server = find_by_name(&self.servers, &settings.spec.server_ref.name).ok_or_else(|| ControllerError::ServerNotFound(settings.spec.server_ref.name.clone()))?;

        let maintenance_name = format!("{name}-settings");
        status.maintenance_ref = Some(NamespacedRef::new(&maintenance_name));

        let maintenance = match find_by_name(&self.maintenances, &maintenance_name) {
            Some(m) => m,
            None => {
                self.ensure_maintenance(&maintenance_name, settings).await?;
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

        let bmc = find_by_name(&self.bmcs, &server.spec.bmc_ref.name);
        let secret = bmc.as_ref().and_then(|b| find_by_name(&self.secrets, &b.spec.credentials_ref.name));
        let (bmc, secret) = match (bmc, secret) {
            (Some(bmc), Some(secret)) => (bmc, secret),
            _ => {
                warn!(settings = %name, "bmc or credentials not yet observed, requeuing on next event");
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

        match reconciler::reconcile(&server, &settings.spec.attributes, &settings.spec.version, guard.client(), self.device_timeout).await {
            Ok(state) => {
                status.state = state;
                let applied = state == SettingsState::Applied;
                patch_status(&self.api, &name, serde_json::json!({ "status": status })).await?;
                if applied {
                    let _ = self.maintenance_api.delete(&maintenance_name, &DeleteParams::default()).await;
                }
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
        }
    }

    async fn ensure_maintenance(&self, maintenance_name: &str, settings: &BIOSSettings) -> Result<(), ControllerError> {
        let body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "ServerMaintenance",
            "metadata": { "name": maintenance_name, "namespace": settings.namespace() },
            "spec": ServerMaintenanceSpec {
                server_ref: ClusterRef::new(&settings.spec.server_ref.name),
                policy: settings.spec.maintenance_policy,
                owner_ref: None,
                desired_power: None,
            },
        });
        self.maintenance_api.patch(maintenance_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&body)).await.map_err(ControllerError::Kube)?;
        info!(settings = %settings.name_any(), maintenance = maintenance_name, "created maintenance hold for bios settings");
        Ok(())
    }
}
