//! `vibd` — the registry daemon.
//!
//! Listen address comes from the first CLI argument or `VIB_REGISTRY_ADDR`,
//! defaulting to 0.0.0.0:8500. Log filtering via `RUST_LOG`.

use tracing::info;
use tracing_subscriber::EnvFilter;

use vib_registry::Registry;

const DEFAULT_ADDR: &str = "0.0.0.0:8500";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VIB_REGISTRY_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let registry = Registry::bind(addr.as_str()).await?;
    info!(addr = %registry.local_addr(), "vibd up");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    registry.shutdown();
    Ok(())
}
