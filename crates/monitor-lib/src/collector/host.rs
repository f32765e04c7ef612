//! Host metrics collection
//!
//! Reads:
//! - `<thermal_root>/*/temp` for CPU temperature (millidegrees Celsius)
//! - `nvidia-smi` for GPU temperature, when installed
//! - mounted filesystems through `sysinfo` for disk usage
//! - the system load average

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, System};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::HostSource;
use crate::models::{DiskUsage, HostSample};

/// Default sysfs thermal class directory
pub const DEFAULT_THERMAL_ROOT: &str = "/sys/class/thermal";

/// GPU temperature query tool
pub const DEFAULT_GPU_COMMAND: &str = "nvidia-smi";

const GPU_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Collector for host temperature, disk and load metrics
pub struct SystemHostCollector {
    thermal_root: PathBuf,
    gpu_command: Option<PathBuf>,
    disk_mounts: Vec<String>,
}

impl SystemHostCollector {
    /// Create a collector reporting the given mount points
    pub fn new(disk_mounts: Vec<String>) -> Self {
        Self {
            thermal_root: PathBuf::from(DEFAULT_THERMAL_ROOT),
            gpu_command: Some(PathBuf::from(DEFAULT_GPU_COMMAND)),
            disk_mounts,
        }
    }

    /// Set the GPU query binary; `None` skips GPU temperature entirely
    pub fn with_gpu_command(mut self, gpu_command: Option<PathBuf>) -> Self {
        self.gpu_command = gpu_command;
        self
    }

    /// Set custom thermal class directory (bind-mounted host sysfs, tests)
    pub fn with_thermal_root(mut self, thermal_root: impl Into<PathBuf>) -> Self {
        self.thermal_root = thermal_root.into();
        self
    }

    async fn disks(&self) -> Result<Vec<DiskUsage>> {
        let wanted = self.disk_mounts.clone();

        tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            let mut usage = Vec::with_capacity(wanted.len());

            // Report in configured order, once per mount point
            for mount in &wanted {
                if let Some(disk) = disks
                    .list()
                    .iter()
                    .find(|d| d.mount_point() == Path::new(mount))
                {
                    usage.push(disk_usage(mount, disk.total_space(), disk.available_space()));
                }
            }

            usage
        })
        .await
        .context("Disk usage task panicked")
    }
}

#[async_trait]
impl HostSource for SystemHostCollector {
    async fn collect(&self) -> Result<HostSample> {
        let cpu_temp = read_max_thermal(&self.thermal_root).await;
        let gpu_temp = match &self.gpu_command {
            Some(command) => read_gpu_temp(command, GPU_QUERY_TIMEOUT).await,
            None => None,
        };
        let disk = self.disks().await?;
        let load = System::load_average();

        Ok(HostSample {
            cpu_temp,
            gpu_temp,
            disk,
            load_avg: [round2(load.one), round2(load.five), round2(load.fifteen)],
            timestamp: Utc::now(),
        })
    }
}

/// Highest temperature across all thermal zones, rounded to one decimal.
///
/// Zones whose `temp` file is missing or unparsable are skipped; `None`
/// is returned when no zone could be read.
pub async fn read_max_thermal(thermal_root: &Path) -> Option<f64> {
    let mut entries = fs::read_dir(thermal_root).await.ok()?;
    let mut max: Option<f64> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(content) = fs::read_to_string(entry.path().join("temp")).await else {
            continue;
        };
        let Ok(millidegrees) = content.trim().parse::<f64>() else {
            continue;
        };

        let celsius = millidegrees / 1000.0;
        max = Some(max.map_or(celsius, |m| m.max(celsius)));
    }

    max.map(|t| (t * 10.0).round() / 10.0)
}

/// Hottest GPU reported by `nvidia-smi`.
///
/// Any failure (tool missing, non-zero exit, timeout, unparsable output)
/// yields `None`; hosts without a GPU are the common case.
pub async fn read_gpu_temp(command: &Path, timeout: Duration) -> Option<f64> {
    let mut cmd = Command::new(command);
    cmd.args([
        "--query-gpu=temperature.gpu",
        "--format=csv,noheader,nounits",
    ])
    .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(code = ?output.status.code(), "GPU temperature query failed");
            return None;
        }
        Ok(Err(e)) => {
            debug!(error = %e, "GPU temperature tool unavailable");
            return None;
        }
        Err(_) => {
            debug!("GPU temperature query timed out");
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut max: Option<f64> = None;
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let temp = line.parse::<f64>().ok()?;
        max = Some(max.map_or(temp, |m| m.max(temp)));
    }
    max
}

/// Build a [`DiskUsage`] from total and available byte counts
pub fn disk_usage(mount: &str, total: u64, available: u64) -> DiskUsage {
    let used = total.saturating_sub(available);
    let pct = if total > 0 {
        ((used as f64 / total as f64) * 1000.0).round() / 10.0
    } else {
        0.0
    };

    DiskUsage {
        mount: mount.to_string(),
        total,
        used,
        free: available,
        pct,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
