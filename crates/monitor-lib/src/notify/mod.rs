//! Outbound alert delivery
//!
//! A [`Notifier`] delivers one alert to an external channel. Cooldown and
//! failure handling live in [`Alerter`](crate::anomaly::Alerter); notifiers
//! only report whether a single delivery attempt succeeded.

mod telegram;

pub use telegram::{TelegramNotifier, DEFAULT_TELEGRAM_API};

use crate::models::AlertEvent;
use async_trait::async_trait;

/// Errors from a single delivery attempt
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint rejected alert with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Trait for alert delivery channels
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in logs and metrics
    fn name(&self) -> &str;

    /// Deliver one alert
    async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError>;
}
