//! Docker Monitor - container and host anomaly monitor
//!
//! This binary runs next to the Docker daemon, sampling container and host
//! metrics, storing them in SQLite, alerting on anomalies and serving the
//! dashboard API.

use std::sync::Arc;

use anyhow::{Context, Result};
use docker_monitor::{
    api,
    auth::AuthGate,
    config::MonitorConfig,
    settings::{Settings, SettingsStore},
};
use monitor_lib::{
    anomaly::{Alerter, AnomalyDetector},
    collector::{DockerCliCollector, SystemHostCollector},
    health::HealthRegistry,
    notify::{Notifier, TelegramNotifier},
    observability::StructuredLogger,
    CycleLoopBuilder, LatestSnapshot, Store,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting docker-monitor");

    let config = MonitorConfig::load()?;
    info!(
        host = %config.host_name,
        db_path = %config.db_path.display(),
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.host_name);

    let store = Store::open(&config.db_path).context("Failed to open database")?;

    let notifier = TelegramNotifier::from_credentials(
        &config.telegram_bot_token,
        &config.telegram_chat_id,
    )?
    .map(|n| Arc::new(n) as Arc<dyn Notifier>);
    if notifier.is_none() {
        warn!("Telegram credentials not set, notifications disabled");
    }
    let alerter = Arc::new(Alerter::new(notifier).with_cooldown(config.alert_cooldown()));

    let latest = LatestSnapshot::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let docker = Arc::new(DockerCliCollector::new(&config.docker_bin));

    let cycle_loop = CycleLoopBuilder::new()
        .containers(docker.clone())
        .images(docker)
        .host(Arc::new(
            SystemHostCollector::new(config.disk_mounts.clone())
                .with_thermal_root(&config.thermal_root)
                .with_gpu_command(config.gpu_command()),
        ))
        .store(store.clone())
        .alerter(alerter.clone())
        .detector(AnomalyDetector::new(config.detector.clone()))
        .latest(latest.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(config.collect_interval())
        .retention_days(config.retention_days)
        .build()?;

    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        latest,
        store,
        auth: AuthGate::new(config.auth_file(), &config.auth_user, &config.auth_pass),
        settings: SettingsStore::new(
            config.settings_file(),
            Settings {
                max_connections: config.max_connections,
            },
        ),
    });

    logger.log_startup(
        MONITOR_VERSION,
        config.collect_interval(),
        alerter.is_enabled(),
    );

    let cycle_handle = tokio::spawn(cycle_loop.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = cycle_handle.await {
        error!(error = %e, "Cycle loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
