use std::sync::Arc;
use tracing::{info, warn};
use wharf_core::runtime::RuntimeAdapter;
use wharf_core::{init_observability, ComposeCliAdapter, Config, DockerAdapter, ProjectStore, SourceSync};

mod orchestrator;
mod reconcile;
mod watcher;

#[cfg(test)]
mod testutil;

use orchestrator::Orchestrator;
use watcher::Watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    // Initialize observability FIRST
    init_observability(config.metrics_port)?;

    info!("wharf daemon starting");
    info!(base_domain = %config.base_domain, deployments = %config.deployments_dir.display(), "Configuration loaded");

    let store = ProjectStore::new(config.db_path()).await?;
    let source = SourceSync::new(&config.deployments_dir, config.ssh_key_path.clone());

    let docker_adapter = DockerAdapter::new()?;
    // A dead Docker daemon at boot should not keep wharfd from starting;
    // deploys will surface the real error.
    if let Err(e) = docker_adapter.ensure_network().await {
        warn!("Could not ensure proxy network: {}", e);
    }

    let image_adapter: Arc<dyn RuntimeAdapter> = Arc::new(docker_adapter);
    let compose_adapter: Arc<dyn RuntimeAdapter> =
        Arc::new(ComposeCliAdapter::new(&config.deployments_dir));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        source.clone(),
        image_adapter,
        compose_adapter,
        config.base_domain.clone(),
    ));

    let report = reconcile::reconcile(&store).await?;
    if report.interrupted > 0 {
        info!("Marked {} interrupted deploys as errored", report.interrupted);
    }

    let mut watcher = Watcher::new(store, source, orchestrator, config.watch_interval);
    watcher.start();

    info!("wharf daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    watcher.stop().await;

    info!("wharf daemon shutting down");
    Ok(())
}
