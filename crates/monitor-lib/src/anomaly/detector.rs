//! Threshold-based anomaly detection across collection cycles
//!
//! The detector keeps per-container memory between cycles:
//! - consecutive cycles with CPU above threshold
//! - the last restart count seen
//! - the last cumulative RX byte counter seen
//!
//! Every rule re-fires on each qualifying cycle. Suppressing repeats is the
//! job of the [`Alerter`](super::Alerter) cooldown, not of the detector.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::DetectorConfig;
use crate::models::{AlertEvent, AlertKind, ContainerSample, HostSample};

/// Target used for host-wide alerts
pub const HOST_TARGET: &str = "host";

/// Cross-cycle memory owned by one detector
#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    cpu_counts: HashMap<String, u32>,
    prev_restarts: HashMap<String, u64>,
    prev_net_rx: HashMap<String, u64>,
    last_seen: HashMap<String, u64>,
    cycle: u64,
    active_anomalies: Vec<AlertEvent>,
}

impl DetectorState {
    /// Consecutive over-threshold CPU cycles for a container
    pub fn cpu_count(&self, name: &str) -> Option<u32> {
        self.cpu_counts.get(name).copied()
    }

    /// Restart baseline for a container
    pub fn prev_restarts(&self, name: &str) -> Option<u64> {
        self.prev_restarts.get(name).copied()
    }

    /// RX baseline for a container
    pub fn prev_net_rx(&self, name: &str) -> Option<u64> {
        self.prev_net_rx.get(name).copied()
    }

    /// Number of completed `check` calls
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn forget(&mut self, name: &str) {
        self.cpu_counts.remove(name);
        self.prev_restarts.remove(name);
        self.prev_net_rx.remove(name);
        self.last_seen.remove(name);
    }
}

/// Stateful rule engine evaluated once per collection cycle
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Alerts raised by the most recent `check` call
    pub fn active_anomalies(&self) -> &[AlertEvent] {
        &self.state.active_anomalies
    }

    /// Number of container names with retained state
    pub fn tracked_containers(&self) -> usize {
        self.state.last_seen.len()
    }

    /// Run every rule against one cycle of samples.
    ///
    /// Alerts are ordered CPU, memory, restart, network per container in
    /// input order, followed by host temperature and then disks. The cycle
    /// timestamp stamped on each alert is `host.timestamp`.
    pub fn check(&mut self, containers: &[ContainerSample], host: &HostSample) -> Vec<AlertEvent> {
        let now = host.timestamp;
        let mut alerts = Vec::new();

        self.state.cycle += 1;

        for sample in containers {
            self.check_container(sample, now, &mut alerts);
        }

        self.check_host(host, now, &mut alerts);
        self.evict_stale();

        self.state.active_anomalies = alerts.clone();
        alerts
    }

    fn check_container(
        &mut self,
        sample: &ContainerSample,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertEvent>,
    ) {
        let cfg = &self.config;
        let state = &mut self.state;
        let name = sample.name.as_str();

        state.last_seen.insert(name.to_string(), state.cycle);

        // Sustained CPU: reset, not decrement, on a cycle at or under threshold
        let count = state.cpu_counts.entry(name.to_string()).or_insert(0);
        if sample.cpu_pct > cfg.cpu_threshold {
            *count += 1;
        } else {
            *count = 0;
        }
        if *count >= cfg.cpu_consecutive {
            alerts.push(AlertEvent::new(
                AlertKind::CpuHigh,
                name,
                sample.cpu_pct,
                now,
                format!(
                    "Container {} CPU {:.1}% (>{:.1}% x{})",
                    name, sample.cpu_pct, cfg.cpu_threshold, cfg.cpu_consecutive
                ),
            ));
        }

        if sample.mem_pct > cfg.mem_threshold {
            alerts.push(AlertEvent::new(
                AlertKind::MemHigh,
                name,
                sample.mem_pct,
                now,
                format!(
                    "Container {} Memory {:.1}% (>{:.1}%)",
                    name, sample.mem_pct, cfg.mem_threshold
                ),
            ));
        }

        // A lower count than the baseline means the container was recreated
        let current = sample.restart_count;
        if let Some(prev) = state.prev_restarts.insert(name.to_string(), current) {
            if current > prev {
                alerts.push(AlertEvent::new(
                    AlertKind::Restart,
                    name,
                    current as f64,
                    now,
                    format!("Container {} restarted (count {} -> {})", name, prev, current),
                ));
            }
        }

        let current_rx = sample.net_rx;
        if let Some(prev_rx) = state.prev_net_rx.insert(name.to_string(), current_rx) {
            let multiplied = prev_rx as f64 * cfg.net_spike_multiplier;
            if prev_rx > 0
                && current_rx as f64 > multiplied
                && current_rx > cfg.net_spike_min_bytes
            {
                alerts.push(AlertEvent::new(
                    AlertKind::NetSpike,
                    name,
                    current_rx as f64,
                    now,
                    format!(
                        "Container {} Network RX spike: {} -> {}",
                        name,
                        format_bytes(prev_rx),
                        format_bytes(current_rx)
                    ),
                ));
            }
        }
    }

    fn check_host(&self, host: &HostSample, now: DateTime<Utc>, alerts: &mut Vec<AlertEvent>) {
        let cfg = &self.config;

        if let Some(temp) = host.cpu_temp {
            if temp > cfg.host_temp_threshold {
                alerts.push(AlertEvent::new(
                    AlertKind::HostTemp,
                    HOST_TARGET,
                    temp,
                    now,
                    format!(
                        "Host CPU temperature {:.1}°C (>{:.1}°C)",
                        temp, cfg.host_temp_threshold
                    ),
                ));
            }
        }

        for disk in &host.disk {
            if disk.pct > cfg.disk_threshold {
                alerts.push(AlertEvent::new(
                    AlertKind::DiskHigh,
                    disk.mount.as_str(),
                    disk.pct,
                    now,
                    format!(
                        "Host disk {} usage {:.1}% (>{:.1}%)",
                        disk.mount, disk.pct, cfg.disk_threshold
                    ),
                ));
            }
        }
    }

    fn evict_stale(&mut self) {
        let Some(max_age) = self.config.evict_after_cycles else {
            return;
        };

        let cycle = self.state.cycle;
        let stale: Vec<String> = self
            .state
            .last_seen
            .iter()
            .filter(|(_, seen)| cycle - **seen >= max_age)
            .map(|(name, _)| name.clone())
            .collect();

        for name in stale {
            tracing::debug!(container = %name, "Evicting detector state for vanished container");
            self.state.forget(&name);
        }
    }
}

/// Render a byte count with binary units and one decimal, e.g. `1536` -> `1.5KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1}{}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1}PB", value)
}
