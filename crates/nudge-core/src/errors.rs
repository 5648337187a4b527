//! Core error types.

use thiserror::Error;

/// Errors raised by input validation in the core.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A session identifier was missing, empty, or whitespace only.
    #[error("session id must not be empty")]
    EmptySessionId,
}

/// Why a frame could not be written to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The reader is alive but its queue is full.
    #[error("channel queue is full")]
    Full,
    /// The reader side has gone away.
    #[error("channel is closed")]
    Closed,
}
