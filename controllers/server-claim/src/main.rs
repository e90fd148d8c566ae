//! ServerClaim controller (C5): binds claims to available Servers and
//! enforces at-most-one binding across concurrently reconciling claims.

mod error;
mod reconciler;
mod selection;
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
#[command(name = "server-claim-controller")]
struct Config {
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 8)]
    max_concurrent_reconciles: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::parse();
    info!(max_concurrent = config.max_concurrent_reconciles, "starting server-claim-controller");

    let client = Client::try_default().await.map_err(ControllerError::Kube)?;

    let claims: Api<crds::server_claim::ServerClaim> = Api::all(client.clone());
    let servers: Api<crds::server::Server> = Api::all(client.clone());
    let boot_configs: Api<crds::boot_configuration::ServerBootConfiguration> = Api::all(client.clone());

    let server_cache = ObjectCache::start(servers.clone(), WatcherConfig::default()).await;

    let watcher = Watcher::new(claims, servers, boot_configs, server_cache, config.max_concurrent_reconciles);

    watcher.run().await?;
    Ok(())
}
