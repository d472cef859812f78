//! DataImage Controller
//!
//! Keeps `DataImage` resources in sync with the image the provisioning
//! backend reports as attached to the correlated `BareMetalHost`, and holds
//! a finalizer on each DataImage until its image has been detached.

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod finalizer;
mod reconciler;
mod store;
mod trigger;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting DataImage Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Provisioner URL: {}", config.provisioner_url);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
