//! # nudge-server
//!
//! Axum HTTP server around the push-messaging core.
//!
//! - `GET /stream?sessionId=…`: Server-Sent Events stream for one session
//! - `POST /sessions`: issue a fresh session id
//! - `POST /sessions/{sessionId}/push`: trigger ingress for proactive messages
//! - `GET /health`, `GET /metrics`
//! - Idle-session sweeper and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod stream;
pub mod sweeper;
pub mod trigger;

pub use config::ServerConfig;
pub use error::ApiError;
pub use identity::{HeaderIdentityResolver, IdentityResolver};
pub use server::NudgeServer;
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
