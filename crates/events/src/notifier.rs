use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Error type for notification delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    /// The request URL is stripped since it may embed credentials.
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The messaging API answered but rejected the call.
    #[error("Messaging API rejected {method} (HTTP {status}): {description}")]
    Api {
        method: &'static str,
        status: u16,
        description: String,
    },

    /// The attachment could not be read from disk.
    #[error("Failed to read attachment {path:?}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url())
    }
}

/// Delivers text and files to a chat recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError>;

    /// Send the file at `path` as a document attachment.
    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), NotifyError>;
}
