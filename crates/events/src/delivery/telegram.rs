//! Telegram Bot API delivery.
//!
//! [`TelegramNotifier`] calls `sendMessage` and `sendDocument` over HTTPS.
//! Configuration is loaded from environment variables; if `BOT_TOKEN` is
//! not set, [`TelegramConfig::from_env`] returns `None` and notifications
//! are skipped.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use modelforge_core::config;
use modelforge_core::naming::content_type_for;

use crate::notifier::{Notifier, NotifyError};

/// Public Bot API host.
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// HTTP timeout for a single call; documents can be tens of megabytes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// TelegramConfig
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramConfig {
    /// | Variable            | Required | Default                    |
    /// |---------------------|----------|----------------------------|
    /// | `BOT_TOKEN`         | yes      | --                          |
    /// | `TELEGRAM_API_BASE` | no       | `https://api.telegram.org` |
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            config::optional("BOT_TOKEN"),
            config::optional("TELEGRAM_API_BASE"),
        )
    }

    /// Build from already-read values. A missing or blank token disables
    /// delivery; a missing or blank base falls back to the public host.
    pub fn from_values(bot_token: Option<String>, api_base: Option<String>) -> Option<Self> {
        let bot_token = bot_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;
        let api_base = api_base
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Some(Self { bot_token, api_base })
    }
}

// ---------------------------------------------------------------------------
// TelegramNotifier
// ---------------------------------------------------------------------------

/// Envelope every Bot API method returns.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// Full URL of a Bot API method. Contains the token: never log it.
    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Check HTTP status and the `ok` flag of a Bot API response.
    async fn check(
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<(), NotifyError> {
        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();

        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            other => Err(NotifyError::Api {
                method,
                status: status.as_u16(),
                description: other
                    .and_then(|b| b.description)
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;
        Self::check("sendMessage", response).await?;

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| NotifyError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(content_type_for(&file_name))?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        Self::check("sendDocument", response).await?;

        tracing::debug!(chat_id, file = %file_name, size, "Telegram document sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
