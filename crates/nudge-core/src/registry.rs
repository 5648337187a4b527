//! Session → live channel bindings.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::channel::Channel;
use crate::ids::SessionId;

/// Holds at most one live channel per session.
///
/// The registry's references are non-owning in spirit: it writes through them
/// and forgets them, but never closes a channel itself. Mutations for one
/// session are linearized by the shard lock; different sessions rarely share
/// a shard and never share a lock for long.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<SessionId, Arc<Channel>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `channel` as the live channel for `session_id`.
    ///
    /// Returns the channel it replaced, if any. The replaced channel is only
    /// forgotten; its owner is responsible for tearing it down.
    pub fn register(&self, session_id: &SessionId, channel: Arc<Channel>) -> Option<Arc<Channel>> {
        let new_id = channel.id().clone();
        let replaced = self.channels.insert(session_id.clone(), channel);
        if let Some(old) = &replaced {
            debug!(
                session_id = %session_id,
                old_channel = %old.id(),
                new_channel = %new_id,
                "channel replaced"
            );
        }
        replaced
    }

    /// Remove the binding for `session_id` only if it still points at
    /// `channel`. A stale connection deregistering late is a no-op.
    pub fn deregister(&self, session_id: &SessionId, channel: &Channel) -> bool {
        let removed = self
            .channels
            .remove_if(session_id, |_, current| current.id() == channel.id());
        if removed.is_none() {
            debug!(
                session_id = %session_id,
                channel = %channel.id(),
                "deregister ignored, channel no longer current"
            );
        }
        removed.is_some()
    }

    /// Current live channel for `session_id`.
    pub fn lookup(&self, session_id: &SessionId) -> Option<Arc<Channel>> {
        self.channels.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `session_id` has a live channel.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.channels.contains_key(session_id)
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no session has a live channel.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
