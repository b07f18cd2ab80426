//! Fleet Monitor - fleet health-monitoring daemon
//!
//! Polls host resources, the container runtime and the CI runner registry,
//! keeps the alert set, notifies on raise/resolve and serves the health view.

use anyhow::Result;
use fleet_monitor_agent::{api, config::DaemonConfig};
use monitor_lib::{
    clock::{Clock, SystemClock},
    monitor::{build_sink, build_sources, MonitorRuntime},
    observability::{MonitorMetrics, StructuredLogger},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleet-monitor");

    // Load configuration
    let config = DaemonConfig::load()?;
    info!(
        node_name = %config.daemon.node_name,
        api_port = config.daemon.api_port,
        "Monitor configured"
    );

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.daemon.node_name);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sources = build_sources(&config.monitor, clock.clone())?;
    let sink = build_sink(&config.monitor)?;
    let runtime = MonitorRuntime::start(config.monitor, sources, sink, clock, logger)?;

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(runtime.state(), metrics));

    // Start health, metrics and query server
    let api_handle = tokio::spawn(api::serve(config.daemon.api_port, app_state));

    // Wait for shutdown signal or a server failure
    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            "SIGINT received"
        }
        served = api_handle => {
            match served {
                Ok(Ok(())) => "API server stopped",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    runtime.shutdown(reason).await;
    info!("Shutdown complete");

    Ok(())
}
