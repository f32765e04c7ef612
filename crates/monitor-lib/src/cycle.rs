//! Collection cycle loop
//!
//! Implements the main loop that periodically samples containers and the
//! host, persists the samples, runs the anomaly detector, records and
//! notifies alerts, and publishes the latest snapshot for API readers.
//!
//! The loop is the only owner of the [`AnomalyDetector`]; readers only ever
//! see [`Snapshot`] values swapped in behind a lock.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::anomaly::{Alerter, AnomalyDetector, Delivery};
use crate::collector::{ContainerSource, HostSource, ImageSource};
use crate::health::{components, HealthRegistry};
use crate::models::{AlertEvent, ContainerSample, HostSample, ImageUsage, Snapshot};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::storage::Store;

/// Retention cleanup runs once a day at the default 10 second interval
const DEFAULT_CLEANUP_EVERY: u64 = 8640;

/// Image usage is refreshed every sixth cycle, about once a minute
const DEFAULT_IMAGES_EVERY: u64 = 6;

/// Configuration for the cycle loop
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Delay between cycles (default: 10 seconds)
    pub interval: Duration,
    /// Samples and alerts older than this are deleted (default: 7 days)
    pub retention_days: u64,
    /// Run retention cleanup every this many completed cycles
    pub cleanup_every: u64,
    /// Refresh image usage every this many cycles, starting with the first
    pub images_every: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            retention_days: 7,
            cleanup_every: DEFAULT_CLEANUP_EVERY,
            images_every: DEFAULT_IMAGES_EVERY,
        }
    }
}

/// Latest published snapshot, shared between the loop and API readers
#[derive(Debug, Clone, Default)]
pub struct LatestSnapshot {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl LatestSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot atomically
    pub async fn publish(&self, snapshot: Snapshot) {
        *self.inner.write().await = Some(snapshot);
    }

    pub async fn get(&self) -> Option<Snapshot> {
        self.inner.read().await.clone()
    }

    /// Time the latest snapshot was published
    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.as_ref().map(|s| s.ts)
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub containers: usize,
    pub alerts: usize,
    /// Alerts the notifier accepted
    pub delivered: usize,
    pub duration: Duration,
}

/// Periodic collect, detect and notify loop
pub struct CycleLoop {
    containers: Arc<dyn ContainerSource>,
    host: Arc<dyn HostSource>,
    images: Option<Arc<dyn ImageSource>>,
    store: Store,
    alerter: Arc<Alerter>,
    detector: AnomalyDetector,
    latest: LatestSnapshot,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    config: CycleConfig,
    /// Last successful image usage reading
    image_usage: Option<ImageUsage>,
    /// Completed cycles
    cycle: u64,
}

impl CycleLoop {
    /// Run until the shutdown signal fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_days = self.config.retention_days,
            "Starting collection cycle loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => {
                            debug!(
                                containers = report.containers,
                                alerts = report.alerts,
                                delivered = report.delivered,
                                elapsed_ms = report.duration.as_millis() as u64,
                                "Cycle complete"
                            );
                        }
                        Err(e) => {
                            warn!(error = %format!("{e:#}"), "Collection cycle failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down collection cycle loop");
                    break;
                }
            }
        }
    }

    /// Execute one cycle.
    ///
    /// A collector failure aborts the cycle before the detector runs, so
    /// detector state only ever advances on complete input. Storage and
    /// notification failures are recorded and the cycle carries on.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();

        let (containers, host) = match self.collect().await {
            Ok(samples) => samples,
            Err(e) => {
                self.metrics.inc_collection_errors();
                self.health
                    .set_unhealthy(components::COLLECTOR, format!("{e:#}"))
                    .await;
                return Err(e);
            }
        };
        self.health.set_healthy(components::COLLECTOR).await;

        let mut storage_ok = self.persist_samples(&containers, &host).await;

        if self.cycle % self.config.images_every.max(1) == 0 {
            self.refresh_images().await;
        }

        let alerts = self.detector.check(&containers, &host);
        let mut delivered = 0;

        for alert in &alerts {
            self.metrics.inc_alert(alert);
            self.logger.log_alert(alert);

            storage_ok &= self.persist_alert(alert).await;

            let delivery = self.alerter.dispatch(alert).await;
            self.metrics.inc_notification(delivery);
            match delivery {
                Delivery::Sent => {
                    delivered += 1;
                    self.health.set_healthy(components::NOTIFIER).await;
                }
                Delivery::Failed => {
                    self.health
                        .set_degraded(components::NOTIFIER, "Last notification failed")
                        .await;
                }
                Delivery::Suppressed | Delivery::Disabled => {}
            }
        }

        let report = CycleReport {
            containers: containers.len(),
            alerts: alerts.len(),
            delivered,
            duration: start.elapsed(),
        };

        let snapshot = Snapshot {
            containers,
            host,
            images: self.image_usage.clone(),
            anomalies: self.detector.active_anomalies().to_vec(),
            ts: Utc::now(),
        };
        let published_at = snapshot.ts;
        self.latest.publish(snapshot).await;

        if self.cycle > 0 && self.cycle % self.config.cleanup_every.max(1) == 0 {
            storage_ok &= self.cleanup().await;
        }
        self.cycle += 1;

        if storage_ok {
            self.health.set_healthy(components::STORAGE).await;
        }
        self.health.set_ready(true).await;

        self.metrics.set_containers_monitored(report.containers);
        self.metrics.set_last_cycle(published_at.timestamp());
        self.metrics.observe_cycle_latency(report.duration);
        self.logger
            .log_cycle(report.containers, report.alerts, report.duration);

        Ok(report)
    }

    /// The detector owned by this loop (tests, diagnostics)
    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    async fn collect(&self) -> Result<(Vec<ContainerSample>, HostSample)> {
        let (containers, host) = tokio::join!(self.containers.collect(), self.host.collect());
        let containers = containers.context("Container collection failed")?;
        let host = host.context("Host collection failed")?;
        Ok((containers, host))
    }

    /// Failures keep the previous reading
    async fn refresh_images(&mut self) {
        let Some(source) = &self.images else {
            return;
        };

        match source.collect_images().await {
            Ok(usage) => self.image_usage = Some(usage),
            Err(e) => warn!(error = %format!("{e:#}"), "Image usage collection failed"),
        }
    }

    async fn persist_samples(&self, containers: &[ContainerSample], host: &HostSample) -> bool {
        let containers = containers.to_vec();
        let host = host.clone();

        let result = self
            .store
            .run_blocking(move |store| {
                store.insert_container_samples(&containers)?;
                store.insert_host_sample(&host)
            })
            .await;

        self.record_storage_result(result, "Failed to store samples")
            .await
    }

    async fn persist_alert(&self, alert: &AlertEvent) -> bool {
        let alert = alert.clone();
        let result = self
            .store
            .run_blocking(move |store| store.insert_alert(&alert))
            .await;

        self.record_storage_result(result, "Failed to store alert")
            .await
    }

    async fn cleanup(&self) -> bool {
        let before = Utc::now() - chrono::Duration::days(self.config.retention_days as i64);
        let result = self
            .store
            .run_blocking(move |store| store.cleanup(before))
            .await;

        self.alerter.prune();

        match result {
            Ok(deleted) => {
                self.metrics.add_pruned_rows(deleted);
                if deleted > 0 {
                    self.logger
                        .log_cleanup(deleted, self.config.retention_days);
                }
                true
            }
            Err(e) => {
                self.record_storage_result::<()>(Err(e), "Retention cleanup failed")
                    .await
            }
        }
    }

    async fn record_storage_result<T>(&self, result: Result<T>, what: &str) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "{}", what);
                self.metrics.inc_storage_errors();
                self.health
                    .set_degraded(components::STORAGE, format!("{what}: {e}"))
                    .await;
                false
            }
        }
    }
}

/// Builder for creating the cycle loop
pub struct CycleLoopBuilder {
    containers: Option<Arc<dyn ContainerSource>>,
    host: Option<Arc<dyn HostSource>>,
    images: Option<Arc<dyn ImageSource>>,
    store: Option<Store>,
    alerter: Option<Arc<Alerter>>,
    detector: AnomalyDetector,
    latest: LatestSnapshot,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    config: CycleConfig,
}

impl CycleLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            containers: None,
            host: None,
            images: None,
            store: None,
            alerter: None,
            detector: AnomalyDetector::default(),
            latest: LatestSnapshot::new(),
            health: HealthRegistry::new(),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("localhost"),
            config: CycleConfig::default(),
        }
    }

    pub fn containers(mut self, source: Arc<dyn ContainerSource>) -> Self {
        self.containers = Some(source);
        self
    }

    pub fn host(mut self, source: Arc<dyn HostSource>) -> Self {
        self.host = Some(source);
        self
    }

    /// Optional image usage source, refreshed every `images_every` cycles
    pub fn images(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.images = Some(source);
        self
    }

    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn alerter(mut self, alerter: Arc<Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn detector(mut self, detector: AnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Share the snapshot handle the API reads from
    pub fn latest(mut self, latest: LatestSnapshot) -> Self {
        self.latest = latest;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn retention_days(mut self, days: u64) -> Self {
        self.config.retention_days = days;
        self
    }

    pub fn cleanup_every(mut self, cycles: u64) -> Self {
        self.config.cleanup_every = cycles;
        self
    }

    pub fn images_every(mut self, cycles: u64) -> Self {
        self.config.images_every = cycles;
        self
    }

    /// Build the cycle loop
    pub fn build(self) -> Result<CycleLoop> {
        let containers = self
            .containers
            .ok_or_else(|| anyhow::anyhow!("Container source is required"))?;
        let host = self
            .host
            .ok_or_else(|| anyhow::anyhow!("Host source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let alerter = self
            .alerter
            .ok_or_else(|| anyhow::anyhow!("Alerter is required"))?;

        Ok(CycleLoop {
            containers,
            host,
            images: self.images,
            store,
            alerter,
            detector: self.detector,
            latest: self.latest,
            health: self.health,
            metrics: self.metrics,
            logger: self.logger,
            config: self.config,
            image_usage: None,
            cycle: 0,
        })
    }
}

impl Default for CycleLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
