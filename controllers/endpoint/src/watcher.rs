//! Watch loop over `Endpoint`: materializes a `BMCSecret` and `BMC` the
//! first time an endpoint is observed, then leaves the pair alone (the
//! BMC's own fields are the operator's to edit from then on).

use std::sync::Arc;

use crds::bmc::{BmcEndpoint, BmcProtocol, BmcSpec, InlineEndpoint};
use crds::bmc_secret::BmcSecretSpec;
use crds::endpoint::{Endpoint, ENDPOINT_FINALIZER};
use crds::references::ClusterRef;
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use runtime::KeyedLocks;
use store::{ensure_finalizer, patch_status, remove_finalizer};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::ControllerError;
use crate::reconciler::plan_for_mac;

pub struct Watcher {
    api: Api<Endpoint>,
    bmc_api: Api<crds::bmc::BMC>,
    secret_api: Api<crds::bmc_secret::BMCSecret>,
    locks: Arc<KeyedLocks>,
    semaphore: Arc<Semaphore>,
}

impl Watcher {
    pub fn new(api: Api<Endpoint>, bmc_api: Api<crds::bmc::BMC>, secret_api: Api<crds::bmc_secret::BMCSecret>, max_concurrent: usize) -> Self {
        Self { api, bmc_api, secret_api, locks: Arc::new(KeyedLocks::new()), semaphore: Arc::new(Semaphore::new(max_concurrent)) }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("starting Endpoint watcher");
        let mut stream = Box::pin(watcher::watcher(self.api.clone(), Config::default()).default_backoff().touched_objects());

        while let Some(event) = stream.next().await {
            let endpoint = match event {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    warn!(error = %err, "endpoint watch stream error");
                    continue;
                }
            };

            let name = endpoint.name_any();
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            let _guard = self.locks.acquire(&name).await;

            if endpoint.meta().deletion_timestamp.is_some() {
                if let Err(err) = remove_finalizer(&self.api, &endpoint, ENDPOINT_FINALIZER).await {
                    error!(endpoint = %name, error = %err, "failed to remove endpoint finalizer");
                }
                continue;
            }

            if let Err(err) = ensure_finalizer(&self.api, &endpoint, ENDPOINT_FINALIZER).await {
                error!(endpoint = %name, error = %err, "failed to set endpoint finalizer");
                continue;
            }

            if let Err(err) = self.reconcile_one(&endpoint).await {
                warn!(endpoint = %name, error = %err, class = ?err.classify(), "endpoint reconcile failed");
            }
        }

        Ok(())
    }

    async fn reconcile_one(&self, endpoint: &Endpoint) -> Result<(), ControllerError> {
        let name = endpoint.name_any();

        if endpoint.status.as_ref().and_then(|s| s.bmc_ref.as_ref()).is_some() {
            return Ok(());
        }

        let plan = match plan_for_mac(&endpoint.spec.mac) {
            Ok(plan) => plan,
            Err(err) => {
                patch_status(&self.api, &name, serde_json::json!({ "status": { "error": err.to_string() } })).await?;
                return Err(err);
            }
        };

        let secret_name = format!("{name}-secret");
        let secret_body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "BMCSecret",
            "metadata": { "name": secret_name },
            "spec": BmcSecretSpec { username: plan.username_encoded, password: plan.password_encoded },
        });
        self.secret_api.patch(&secret_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&secret_body)).await.map_err(ControllerError::Kube)?;

        let bmc_name = format!("{name}-bmc");
        let bmc_spec = BmcSpec {
            endpoint: BmcEndpoint::Inline(InlineEndpoint { ip: endpoint.spec.ip.clone(), mac: endpoint.spec.mac.clone() }),
            protocol: BmcProtocol::Redfish,
            port: 443,
            credentials_ref: ClusterRef::new(&secret_name),
            bmc_settings_ref: None,
            server_count: 1,
        };
        let bmc_body = serde_json::json!({
            "apiVersion": "metal.dcops.io/v1alpha1",
            "kind": "BMC",
            "metadata": { "name": bmc_name },
            "spec": bmc_spec,
        });
        self.bmc_api.patch(&bmc_name, &PatchParams::apply("metalctl").force(), &Patch::Apply(&bmc_body)).await.map_err(ControllerError::Kube)?;

        patch_status(&self.api, &name, serde_json::json!({ "status": { "bmcRef": ClusterRef::new(&bmc_name), "error": serde_json::Value::Null } })).await?;
        info!(endpoint = %name, bmc = %bmc_name, manufacturer = %plan.manufacturer, "materialized bmc from discovered endpoint");
        Ok(())
    }
}
