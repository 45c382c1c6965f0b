// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() -> Result<(), BuildError> {
    // 1. Initialize Tracing (Logs)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "commitlog_node=debug,commitlog=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Initialize Metrics (Prometheus)
    let handle = PrometheusBuilder::new().install_recorder()?;

    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
    }

    metrics::describe_counter!("commitlog_records_produced_total", "Records appended through the service");
    metrics::describe_counter!("commitlog_records_consumed_total", "Records read through the service");
    metrics::describe_counter!("commitlog_records_replicated_total", "Records copied from peers");
    metrics::describe_counter!("commitlog_auth_denied_total", "Requests rejected by the authorizer");
    metrics::describe_gauge!("commitlog_replication_peers", "Peers currently being replicated from");

    metrics::gauge!("commitlog_node_up", 1.0);
    Ok(())
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
