//! Maintenance arbiter controller (C3): grants and releases exclusive
//! maintenance holds over Servers on behalf of BIOSVersion, BMCSettings
//! and BIOSSettings upgrades.

mod error;
mod reconciler;
mod watcher;

use clap::Parser;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use store::ObjectCache;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ControllerError;
use crate::watcher::Watcher;

#[derive(Debug, Parser)]
#[command(name = "server-maintenance-controller")]
struct Config {
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 8)]
    max_concurrent_reconciles: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::parse();
    info!(max_concurrent = config.max_concurrent_reconciles, "starting server-maintenance-controller");

    let client = Client::try_default().await.map_err(ControllerError::Kube)?;

    let maintenances: Api<crds::maintenance::ServerMaintenance> = Api::all(client.clone());
    let servers: Api<crds::server::Server> = Api::all(client.clone());
    let claims: Api<crds::server_claim::ServerClaim> = Api::all(client.clone());

    let server_cache = ObjectCache::start(servers.clone(), WatcherConfig::default()).await;
    let claim_cache = ObjectCache::start(claims, WatcherConfig::default()).await;

    let watcher = Watcher::new(maintenances, servers, server_cache, claim_cache, config.max_concurrent_reconciles);

    watcher.run().await?;
    Ok(())
}
