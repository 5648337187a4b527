//! # nudge-core
//!
//! Session-addressed push messaging.
//!
//! - [`session::SessionStore`]: idempotent get-or-create of session records
//! - [`registry::ChannelRegistry`]: at most one live output channel per session
//! - [`dispatcher::PushDispatcher`]: best-effort delivery of proactive messages,
//!   plus the attach/detach lifecycle of a stream connection
//!
//! Nothing here performs I/O. The server crate owns the wire adapter.

#![deny(unsafe_code)]

pub mod channel;
pub mod delivery;
pub mod dispatcher;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod registry;
pub mod session;

pub use channel::{Channel, Frame, MessageKind, PushMessage};
pub use delivery::DeliveryPolicy;
pub use dispatcher::{Attachment, ConnectionGuard, DropReason, PushDispatcher, PushOutcome};
pub use errors::{ChannelError, CoreError};
pub use identity::Identity;
pub use ids::{ChannelId, SessionId};
pub use registry::ChannelRegistry;
pub use session::{ReidentifyPolicy, Session, SessionStore};
