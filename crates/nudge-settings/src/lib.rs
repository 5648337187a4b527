//! # nudge-settings
//!
//! Layered configuration for the nudge server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`NudgeSettings::default()`]
//! 2. **User file**: `~/.nudge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `NUDGE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with, settings_path};
pub use types::*;
