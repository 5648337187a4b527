//! Settings types. Every struct deserializes with defaults for missing keys.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NudgeSettings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Session store settings.
    pub sessions: SessionSettings,
    /// Proactive delivery settings.
    pub delivery: DeliverySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// HTTP server network and stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Frames each stream may have queued before pushes are dropped.
    pub channel_capacity: usize,
    /// Interval between SSE keep-alive comments, in seconds.
    pub keep_alive_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            channel_capacity: 64,
            keep_alive_secs: 15,
        }
    }
}

/// How repeat identity on an existing session is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reidentify {
    /// Ignore identity on repeat requests.
    Never,
    /// Anonymous sessions adopt the first authenticated identity.
    #[default]
    UpgradeAnonymous,
}

/// Session store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Evict sessions without a stream after this many idle seconds.
    /// `None` keeps sessions for the life of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
    /// Re-identification policy.
    pub reidentify: Reidentify,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            sweep_interval_secs: 60,
            reidentify: Reidentify::UpgradeAnonymous,
        }
    }
}

/// Delivery mode for pushes to sessions without a live stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Discard the push.
    #[default]
    BestEffort,
    /// Keep a bounded backlog per session, drop-oldest on overflow.
    Backlog,
}

/// Proactive delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Delivery mode.
    pub mode: DeliveryMode,
    /// Per-session backlog size when `mode` is `backlog`.
    pub backlog_capacity: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::BestEffort,
            backlog_capacity: 16,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
