//! Worker-level configuration: queue connection and log output.

use std::str::FromStr;

use modelforge_core::config;
use modelforge_core::error::ConfigError;

/// Queue the original deployment consumed from.
const DEFAULT_QUEUE_NAME: &str = "processing-dev";

/// AMQP connection settings.
///
/// | Variable                  | Required | Default          |
/// |---------------------------|----------|------------------|
/// | `QUEUE_CONNECTION_STRING` | yes      | --                |
/// | `QUEUE_NAME`              | no       | `processing-dev` |
#[derive(Clone)]
pub struct QueueConfig {
    pub connection_string: String,
    pub queue_name: String,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            connection_string: config::required("QUEUE_CONNECTION_STRING")?,
            queue_name: config::or_default("QUEUE_NAME", DEFAULT_QUEUE_NAME),
        })
    }
}

// The connection string carries credentials.
impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("connection_string", &"<redacted>")
            .field("queue_name", &self.queue_name)
            .finish()
    }
}

/// Log line format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

impl LogFormat {
    pub fn from_env() -> Result<Self, ConfigError> {
        config::parse_or("LOG_FORMAT", Self::default())
    }
}
