//! `storelink` binary.

use anyhow::Context;
use storelink_server::{AppState, Config, start_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.parse_server_addr()?;
    tracing::info!(?config, "configuration loaded");

    let state = AppState::from_config(&config).await?;
    start_server(state, addr, config.request_timeout).await.context("server error")?;
    Ok(())
}
