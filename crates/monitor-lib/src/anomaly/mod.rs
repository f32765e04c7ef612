//! Anomaly detection for container and host samples
//!
//! This module provides:
//! - Static-threshold rules evaluated once per collection cycle
//! - Cross-cycle state (sustained CPU, restart and network baselines)
//! - Cooldown-gated alert notification

mod alerter;
mod config;
mod detector;

pub use alerter::{Alerter, Delivery};
pub use config::{ConfigError, DetectorConfig};
pub use detector::{format_bytes, AnomalyDetector, DetectorState, HOST_TARGET};
