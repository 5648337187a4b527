//! # nudge-logging
//!
//! Structured logging with `tracing`.
//!
//! One call at startup installs the global subscriber: an `EnvFilter`
//! (`RUST_LOG` wins over the configured level) feeding either a
//! human-readable or a JSON formatter.

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging initialisation failure.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set and valid, else `default_directive`.
pub fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Default filter directive for a level: our crates at `level`, the HTTP
/// stack one step quieter.
pub fn default_directive(level: LogLevel) -> String {
    let quiet = level.max(LogLevel::Info).quieter();
    format!("{level},hyper={quiet},tower_http={quiet},h2={quiet}")
}

/// Install the global subscriber.
pub fn init_subscriber(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_filter(&default_directive(level));

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()?;
    Ok(())
}
