//! Metrics collection from the container runtime and the host
//!
//! This module provides the per-cycle sample producers consumed by the
//! [`CycleLoop`](crate::cycle::CycleLoop): a Docker collector for container
//! samples and image usage, and a host collector reading thermal zones,
//! GPU temperature, disks and load.

mod docker;
mod host;

#[cfg(test)]
mod tests;

pub use docker::{parse_percent, parse_size, parse_size_pair, CollectError, DockerCliCollector};
pub use host::{
    disk_usage, read_gpu_temp, read_max_thermal, SystemHostCollector, DEFAULT_GPU_COMMAND,
    DEFAULT_THERMAL_ROOT,
};

use crate::models::{ContainerSample, HostSample, ImageUsage};
use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for per-cycle container sample producers
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// Collect one sample for every running container
    async fn collect(&self) -> Result<Vec<ContainerSample>>;
}

/// Trait for per-cycle host sample producers
#[async_trait]
pub trait HostSource: Send + Sync {
    /// Collect one host sample
    async fn collect(&self) -> Result<HostSample>;
}

/// Trait for the less frequent image and volume usage producer
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn collect_images(&self) -> Result<ImageUsage>;
}
