//! Endpoint materialization controller (C0): turns a discovered network
//! endpoint into a BMC and BMCSecret pair the rest of the platform can
//! drive.

mod error;
mod reconciler;
mod watcher;

use clap::Parser;
use kube::{Api, Client};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ControllerError;
use crate::watcher::Watcher;

#[derive(Debug, Parser)]
#[command(name = "endpoint-controller")]
struct Config {
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 8)]
    max_concurrent_reconciles: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::parse();
    info!(max_concurrent = config.max_concurrent_reconciles, "starting endpoint-controller");

    let client = Client::try_default().await.map_err(ControllerError::Kube)?;

    let endpoints: Api<crds::endpoint::Endpoint> = Api::all(client.clone());
    let bmcs: Api<crds::bmc::BMC> = Api::all(client.clone());
    let secrets: Api<crds::bmc_secret::BMCSecret> = Api::all(client.clone());

    let watcher = Watcher::new(endpoints, bmcs, secrets, config.max_concurrent_reconciles);

    watcher.run().await?;
    Ok(())
}
