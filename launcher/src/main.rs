// Launcher binary entry point

use anyhow::{Context, Result};
use common::bootstrap::{build_history, build_trigger_flows, init_database_pool};
use common::config::Settings;
use common::jobs::builtin_registry;
use common::scheduler::PollingScheduler;
use common::telemetry;
use common::LaunchGateway;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    info!("Starting batch trigger launcher");

    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid configuration");
        anyhow::bail!("Invalid configuration: {}", e);
    }

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let db_pool = if settings.requires_database() {
        Some(init_database_pool(&settings).await?)
    } else {
        info!("No database configured, using in-memory execution history");
        None
    };

    let history = build_history(&settings, db_pool.as_ref())?;
    let registry = builtin_registry(&settings).context("Failed to register jobs")?;
    info!(jobs = ?registry.names(), "Jobs registered");

    let gateway = Arc::new(LaunchGateway::new(
        Arc::new(registry),
        history,
        settings.launcher.max_concurrent_executions as usize,
    ));

    let mut scheduler = PollingScheduler::new(Arc::clone(&gateway));
    for flow in build_trigger_flows(&settings, db_pool.as_ref()).await? {
        scheduler.add_flow(flow);
    }
    if scheduler.flow_count() == 0 {
        info!("No trigger sources enabled; nothing will be launched");
    }
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C signal, initiating graceful shutdown");

    scheduler.stop().await;
    gateway.shutdown().await;

    if let Some(pool) = db_pool {
        pool.close().await;
    }
    telemetry::shutdown_tracer();

    info!("Launcher stopped");
    Ok(())
}
