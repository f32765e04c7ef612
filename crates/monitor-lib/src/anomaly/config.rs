//! Static detector thresholds

use serde::Deserialize;

/// Default sustained-CPU threshold (percent)
const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

/// Cycles the CPU must stay above threshold before alerting
const DEFAULT_CPU_CONSECUTIVE: u32 = 3;

const DEFAULT_MEM_THRESHOLD: f64 = 90.0;
const DEFAULT_HOST_TEMP_THRESHOLD: f64 = 85.0;
const DEFAULT_DISK_THRESHOLD: f64 = 90.0;
const DEFAULT_NET_SPIKE_MULTIPLIER: f64 = 10.0;

/// Absolute RX floor for a network spike (100 MiB)
const DEFAULT_NET_SPIKE_MIN_BYTES: u64 = 100 * 1024 * 1024;

/// Thresholds consumed by [`AnomalyDetector`](super::AnomalyDetector)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub cpu_threshold: f64,
    pub cpu_consecutive: u32,
    pub mem_threshold: f64,
    pub host_temp_threshold: f64,
    pub disk_threshold: f64,
    pub net_spike_multiplier: f64,
    pub net_spike_min_bytes: u64,
    /// Drop per-container state after this many cycles without a sample.
    /// `None` keeps state for the lifetime of the process.
    pub evict_after_cycles: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            cpu_consecutive: DEFAULT_CPU_CONSECUTIVE,
            mem_threshold: DEFAULT_MEM_THRESHOLD,
            host_temp_threshold: DEFAULT_HOST_TEMP_THRESHOLD,
            disk_threshold: DEFAULT_DISK_THRESHOLD,
            net_spike_multiplier: DEFAULT_NET_SPIKE_MULTIPLIER,
            net_spike_min_bytes: DEFAULT_NET_SPIKE_MIN_BYTES,
            evict_after_cycles: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("cpu_consecutive must be at least 1")]
    ZeroConsecutive,
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("net_spike_multiplier must be at least 1.0 (got {0})")]
    InvalidMultiplier(f64),
    #[error("evict_after_cycles must be at least 1")]
    ZeroEviction,
}

impl DetectorConfig {
    /// Reject settings that would make a rule fire unconditionally or never
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_consecutive == 0 {
            return Err(ConfigError::ZeroConsecutive);
        }

        for (name, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("mem_threshold", self.mem_threshold),
            ("host_temp_threshold", self.host_temp_threshold),
            ("disk_threshold", self.disk_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if !self.net_spike_multiplier.is_finite() || self.net_spike_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.net_spike_multiplier));
        }

        if self.evict_after_cycles == Some(0) {
            return Err(ConfigError::ZeroEviction);
        }

        Ok(())
    }
}
