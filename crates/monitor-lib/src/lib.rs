//! Monitor library for Docker hosts
//!
//! This crate provides the core functionality for:
//! - Container and host metrics collection
//! - Stateful anomaly detection across collection cycles
//! - Alert notification with cooldown
//! - SQLite persistence and retention
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod cycle;
pub mod health;
pub mod models;
pub mod notify;
pub mod observability;
pub mod storage;

pub use cycle::{CycleConfig, CycleLoop, CycleLoopBuilder, CycleReport, LatestSnapshot};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use storage::Store;
