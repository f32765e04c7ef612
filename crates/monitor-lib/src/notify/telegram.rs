//! Telegram Bot API notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use super::{Notifier, NotifyError};
use crate::models::AlertEvent;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

/// Sends alerts as Markdown messages to a Telegram chat
pub struct TelegramNotifier {
    client: Client,
    endpoint: Url,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier against the public Bot API.
    ///
    /// Returns `None` when either the token or the chat id is empty, which
    /// leaves notifications disabled.
    pub fn from_credentials(token: &str, chat_id: &str) -> Result<Option<Self>, NotifyError> {
        if token.is_empty() || chat_id.is_empty() {
            return Ok(None);
        }
        Self::with_api_base(DEFAULT_TELEGRAM_API, token, chat_id).map(Some)
    }

    /// Create a notifier against a custom API base (self-hosted Bot API, tests).
    ///
    /// Any path on the base is kept, so `https://proxy/tg` posts to
    /// `https://proxy/tg/bot<token>/sendMessage`.
    pub fn with_api_base(api_base: &str, token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        // Tokens contain ':' and must not be resolved as a relative reference
        let base = Url::parse(api_base)?;
        let endpoint = Url::parse(&format!(
            "{}/bot{}/sendMessage",
            base.as_str().trim_end_matches('/'),
            token
        ))?;

        Ok(Self {
            client,
            endpoint,
            chat_id: chat_id.to_string(),
        })
    }

    /// URL alerts are posted to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Message body shown in the chat
    pub fn render(alert: &AlertEvent) -> String {
        format!("🚨 *Docker Monitor Alert*\n\n{}", alert.message)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: Self::render(alert),
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        Ok(())
    }
}
