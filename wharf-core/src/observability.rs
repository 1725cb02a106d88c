//! Observability infrastructure: tracing and metrics.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global observability infrastructure.
///
/// Must be called once at daemon startup before any other operations.
pub fn init(metrics_port: u16) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .init();

    PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], metrics_port)).install()?;

    register_core_metrics();

    tracing::info!(metrics_port, "Observability initialized");
    Ok(())
}

/// Pre-register counters so they export as zero before first use.
fn register_core_metrics() {
    metrics::counter!("wharf_deploys_started_total").absolute(0);
    metrics::counter!("wharf_deploys_succeeded_total").absolute(0);
    metrics::counter!("wharf_deploys_failed_total").absolute(0);
    metrics::counter!("wharf_watcher_scans_total").absolute(0);
}
