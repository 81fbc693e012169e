//! Prometheus metrics HTTP listener.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! Useful with `gleaner stream`, which runs until interrupted.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Must be called from inside the tokio runtime, once per process.
pub fn install_metrics_recorder(addr: SocketAddr) -> Result<()> {
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    gleaner_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");

    Ok(())
}
