//! Core data models for the monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-container measurements taken during one collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
    /// Restart count reported by the runtime, 0 when unknown
    #[serde(default)]
    pub restart_count: u64,
    /// CPU usage in percent of one core (can exceed 100)
    pub cpu_pct: f64,
    pub mem_pct: f64,
    #[serde(default)]
    pub mem_usage: u64,
    #[serde(default)]
    pub mem_limit: u64,
    /// Cumulative received bytes, 0 when unknown
    #[serde(default)]
    pub net_rx: u64,
    #[serde(default)]
    pub net_tx: u64,
    #[serde(default)]
    pub blk_read: u64,
    #[serde(default)]
    pub blk_write: u64,
    pub timestamp: DateTime<Utc>,
}

impl ContainerSample {
    /// Sample carrying only the fields the detector reads
    pub fn new(name: impl Into<String>, cpu_pct: f64, mem_pct: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            image: String::new(),
            status: String::new(),
            restart_count: 0,
            cpu_pct,
            mem_pct,
            mem_usage: 0,
            mem_limit: 0,
            net_rx: 0,
            net_tx: 0,
            blk_read: 0,
            blk_write: 0,
            timestamp,
        }
    }
}

/// Usage of one mounted filesystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub free: u64,
    pub pct: f64,
}

/// Host-level measurements taken during one collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSample {
    /// Hottest thermal zone in °C, absent when unreadable
    pub cpu_temp: Option<f64>,
    /// Hottest GPU in °C as reported by `nvidia-smi`, absent without one
    #[serde(default)]
    pub gpu_temp: Option<f64>,
    #[serde(default)]
    pub disk: Vec<DiskUsage>,
    #[serde(default)]
    pub load_avg: [f64; 3],
    pub timestamp: DateTime<Utc>,
}

impl HostSample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            cpu_temp: None,
            gpu_temp: None,
            disk: Vec::new(),
            load_avg: [0.0; 3],
            timestamp,
        }
    }
}

/// Docker disk usage totals from `docker system df`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageUsage {
    pub image_count: u64,
    pub image_size: u64,
    /// Build cache size in bytes
    pub cache_size: u64,
    pub volume_count: u64,
    pub volume_size: u64,
    /// Writable layers of all containers
    pub container_rw_size: u64,
}

/// Alert classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CpuHigh,
    MemHigh,
    Restart,
    NetSpike,
    HostTemp,
    DiskHigh,
}

impl AlertKind {
    pub const ALL: [AlertKind; 6] = [
        AlertKind::CpuHigh,
        AlertKind::MemHigh,
        AlertKind::Restart,
        AlertKind::NetSpike,
        AlertKind::HostTemp,
        AlertKind::DiskHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CpuHigh => "cpu_high",
            AlertKind::MemHigh => "mem_high",
            AlertKind::Restart => "restart",
            AlertKind::NetSpike => "net_spike",
            AlertKind::HostTemp => "host_temp",
            AlertKind::DiskHigh => "disk_high",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown alert type: {0}")]
pub struct UnknownAlertKind(pub String);

impl FromStr for AlertKind {
    type Err = UnknownAlertKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAlertKind(s.to_string()))
    }
}

/// An alert raised by the detector. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub target: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl AlertEvent {
    pub fn new(
        kind: AlertKind,
        target: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        message: String,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            value,
            timestamp,
            message,
        }
    }
}

/// Latest-cycle view handed to dashboard readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub containers: Vec<ContainerSample>,
    pub host: HostSample,
    /// Latest image usage; collected every few cycles, absent until the
    /// first successful run
    #[serde(default)]
    pub images: Option<ImageUsage>,
    pub anomalies: Vec<AlertEvent>,
    pub ts: DateTime<Utc>,
}
