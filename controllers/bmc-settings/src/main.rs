//! BMC settings controller (C7 cluster-scoped half): applies
//! `BMCSettings.spec.attributes` to a BMC manager under a coordinated
//! lock spanning every server behind it.

mod error;
mod reconciler;
#[cfg(test)]
mod scenarios;
mod watcher;

use std::time::Duration;

use clap::Parser;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use store::ObjectCache;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ControllerError;
use crate::watcher::Watcher;

#[derive(Debug, Parser)]
#[command(name = "bmc-settings-controller")]
struct Config {
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 4)]
    max_concurrent_reconciles: usize,

    #[arg(long, env = "DEVICE_TIMEOUT_SECS", default_value_t = 30)]
    device_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::parse();
    info!(max_concurrent = config.max_concurrent_reconciles, "starting bmc-settings-controller");

    let client = Client::try_default().await.map_err(ControllerError::Kube)?;

    let settings: Api<crds::settings::BMCSettings> = Api::all(client.clone());
    let bmc_maintenance_api: Api<crds::maintenance::BMCMaintenance> = Api::all(client.clone());
    let server_maintenance_api: Api<crds::maintenance::ServerMaintenance> = Api::all(client.clone());
    let bmcs: Api<crds::bmc::BMC> = Api::all(client.clone());
    let servers: Api<crds::server::Server> = Api::all(client.clone());
    let secrets: Api<crds::bmc_secret::BMCSecret> = Api::all(client.clone());
    let endpoints: Api<crds::endpoint::Endpoint> = Api::all(client.clone());

    let bmc_cache = ObjectCache::start(bmcs, WatcherConfig::default()).await;
    let bmc_maintenance_cache = ObjectCache::start(bmc_maintenance_api.clone(), WatcherConfig::default()).await;
    let server_maintenance_cache = ObjectCache::start(server_maintenance_api.clone(), WatcherConfig::default()).await;
    let server_cache = ObjectCache::start(servers, WatcherConfig::default()).await;
    let secret_cache = ObjectCache::start(secrets, WatcherConfig::default()).await;
    let endpoint_cache = ObjectCache::start(endpoints, WatcherConfig::default()).await;

    let watcher = Watcher::new(
        settings,
        bmc_maintenance_api,
        server_maintenance_api,
        bmc_cache,
        bmc_maintenance_cache,
        server_maintenance_cache,
        server_cache,
        secret_cache,
        endpoint_cache,
        config.max_concurrent_reconciles,
        Duration::from_secs(config.device_timeout_secs),
    );

    watcher.run().await?;
    Ok(())
}
