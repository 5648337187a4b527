//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`NudgeSettings::default()`]
//! 2. If `~/.nudge/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `NUDGE_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{DeliveryMode, NudgeSettings};

/// Resolve the path to the settings file (`~/.nudge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".nudge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<NudgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<NudgeSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Load settings using `lookup` in place of the process environment.
pub fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<NudgeSettings> {
    let defaults = serde_json::to_value(NudgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: NudgeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `NUDGE_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_overrides(settings: &mut NudgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("NUDGE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.ranged::<u16>("NUDGE_PORT", 0, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.ranged::<usize>("NUDGE_CHANNEL_CAPACITY", 1, 65_536) {
        settings.server.channel_capacity = v;
    }
    if let Some(v) = env.ranged::<u64>("NUDGE_KEEP_ALIVE_SECS", 1, 3600) {
        settings.server.keep_alive_secs = v;
    }

    // ── Sessions ────────────────────────────────────────────────────
    if let Some(v) = env.ranged::<u64>("NUDGE_SESSION_IDLE_TIMEOUT_SECS", 0, 30 * 86_400) {
        settings.sessions.idle_timeout_secs = (v > 0).then_some(v);
    }
    if let Some(v) = env.ranged::<u64>("NUDGE_SWEEP_INTERVAL_SECS", 1, 86_400) {
        settings.sessions.sweep_interval_secs = v;
    }

    // ── Delivery ────────────────────────────────────────────────────
    if let Some(v) = env.string("NUDGE_DELIVERY_MODE") {
        match parse_delivery_mode(&v) {
            Some(mode) => settings.delivery.mode = mode,
            None => warn!(key = "NUDGE_DELIVERY_MODE", value = %v, "invalid delivery mode, ignoring"),
        }
    }
    if let Some(v) = env.ranged::<usize>("NUDGE_BACKLOG_CAPACITY", 1, 10_000) {
        settings.delivery.backlog_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("NUDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("NUDGE_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

fn validate(settings: &NudgeSettings) -> Result<()> {
    if settings.server.channel_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.channelCapacity must be at least 1".into(),
        ));
    }
    if settings.sessions.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "sessions.sweepIntervalSecs must be at least 1".into(),
        ));
    }
    if settings.delivery.mode == DeliveryMode::Backlog && settings.delivery.backlog_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "delivery.backlogCapacity must be at least 1 in backlog mode".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a delivery mode name (case-insensitive, `-` or `_`).
pub fn parse_delivery_mode(val: &str) -> Option<DeliveryMode> {
    match val.to_lowercase().replace('-', "_").as_str() {
        "best_effort" => Some(DeliveryMode::BestEffort),
        "backlog" => Some(DeliveryMode::Backlog),
        _ => None,
    }
}

/// Parse an integer within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
