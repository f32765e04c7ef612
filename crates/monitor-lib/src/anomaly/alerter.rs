//! Alert notification with cooldown
//!
//! Handles:
//! - Forwarding detector alerts to the configured notifier
//! - Suppressing repeats of the same `(type, target)` within a cooldown window
//! - Swallowing delivery failures so a cycle never aborts on them

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::models::{AlertEvent, AlertKind};
use crate::notify::Notifier;

/// Default cooldown between notifications for the same key (30 minutes)
const DEFAULT_COOLDOWN_SECS: u64 = 30 * 60;

/// Outcome of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Notifier accepted the alert
    Sent,
    /// Same key was delivered within the cooldown window
    Suppressed,
    /// No notifier configured
    Disabled,
    /// Notifier returned an error (already logged)
    Failed,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Suppressed => "suppressed",
            Delivery::Disabled => "disabled",
            Delivery::Failed => "failed",
        }
    }
}

/// Key for cooldown tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    kind: AlertKind,
    target: String,
}

impl CooldownKey {
    fn of(alert: &AlertEvent) -> Self {
        Self {
            kind: alert.kind,
            target: alert.target.clone(),
        }
    }
}

/// Alert dispatcher with per-key cooldown
pub struct Alerter {
    notifier: Option<Arc<dyn Notifier>>,
    cooldown: Duration,
    /// Last successful delivery per key
    last_sent: DashMap<CooldownKey, Instant>,
}

impl Alerter {
    /// Create an alerter with the default 30-minute cooldown
    pub fn new(notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            notifier,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            last_sent: DashMap::new(),
        }
    }

    /// Alerter that never delivers anything
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Set custom cooldown window
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check if an alert falls within the cooldown of an earlier delivery
    pub fn in_cooldown(&self, alert: &AlertEvent) -> bool {
        self.last_sent
            .get(&CooldownKey::of(alert))
            .map(|sent| sent.elapsed() < self.cooldown)
            .unwrap_or(false)
    }

    /// Try to deliver an alert. Never returns an error.
    pub async fn dispatch(&self, alert: &AlertEvent) -> Delivery {
        let Some(notifier) = &self.notifier else {
            return Delivery::Disabled;
        };

        if self.in_cooldown(alert) {
            debug!(
                alert_type = %alert.kind,
                target = %alert.target,
                "Notification suppressed by cooldown"
            );
            return Delivery::Suppressed;
        }

        match notifier.send(alert).await {
            Ok(()) => {
                self.last_sent.insert(CooldownKey::of(alert), Instant::now());
                info!(
                    channel = notifier.name(),
                    alert_type = %alert.kind,
                    target = %alert.target,
                    "Alert notification sent"
                );
                Delivery::Sent
            }
            Err(e) => {
                warn!(
                    event = "notification_failed",
                    channel = notifier.name(),
                    alert_type = %alert.kind,
                    target = %alert.target,
                    error = %e,
                    "Alert notification failed"
                );
                Delivery::Failed
            }
        }
    }

    /// Drop cooldown entries that have expired
    pub fn prune(&self) {
        self.last_sent.retain(|_, sent| sent.elapsed() < self.cooldown);
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.last_sent.len()
    }
}
