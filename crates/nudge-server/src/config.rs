//! Server configuration.

use std::time::Duration;

use nudge_core::{DeliveryPolicy, ReidentifyPolicy};
use nudge_settings::{DeliveryMode, NudgeSettings, Reidentify};
use serde::{Deserialize, Serialize};

/// Configuration for the push server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Undelivered frames a single stream may buffer.
    pub channel_capacity: usize,
    /// Keep-alive comment interval in seconds.
    pub keep_alive_secs: u64,
    /// Evict sessions idle this long without a live stream. `None` disables.
    pub session_idle_timeout_secs: Option<u64>,
    /// How often the idle sweeper runs.
    pub sweep_interval_secs: u64,
    /// What happens to pushes for sessions without a live stream.
    pub delivery: DeliveryPolicy,
    /// How repeat attaches may change a session's identity.
    pub reidentify: ReidentifyPolicy,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &NudgeSettings) -> Self {
        let delivery = match settings.delivery.mode {
            DeliveryMode::BestEffort => DeliveryPolicy::BestEffort,
            DeliveryMode::Backlog => DeliveryPolicy::Backlog {
                capacity: settings.delivery.backlog_capacity,
            },
        };
        let reidentify = match settings.sessions.reidentify {
            Reidentify::Never => ReidentifyPolicy::Never,
            Reidentify::UpgradeAnonymous => ReidentifyPolicy::UpgradeAnonymous,
        };
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            channel_capacity: settings.server.channel_capacity,
            keep_alive_secs: settings.server.keep_alive_secs,
            session_idle_timeout_secs: settings.sessions.idle_timeout_secs,
            sweep_interval_secs: settings.sessions.sweep_interval_secs,
            delivery,
            reidentify,
        }
    }

    /// Keep-alive interval, at least one second.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Idle timeout, if eviction is enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Sweeper period, at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            channel_capacity: 64,
            keep_alive_secs: 15,
            session_idle_timeout_secs: None,
            sweep_interval_secs: 60,
            delivery: DeliveryPolicy::BestEffort,
            reidentify: ReidentifyPolicy::UpgradeAnonymous,
        }
    }
}
