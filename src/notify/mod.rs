//! Outbound notifications
//!
//! The chat transport boundary: the alert engine hands a chat id and a
//! markdown text to a `Notifier` and moves on. Delivery is at-most-once;
//! a failed send is the caller's to log and swallow.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage`.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(api_url: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            bot_token: bot_token.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            bail!("Telegram API returned {}", response.status());
        }
        Ok(())
    }
}

/// Used when no bot token is configured; drops messages.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()> {
        tracing::debug!(chat_id, text, "notification dropped, no transport configured");
        Ok(())
    }
}
