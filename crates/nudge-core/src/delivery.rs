//! What happens to a push when the session has no live channel.

use std::collections::VecDeque;

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use serde::{Deserialize, Serialize};

use crate::channel::Frame;
use crate::ids::SessionId;

/// Delivery policy for proactive pushes.
///
/// `BestEffort` drops a push when no channel is attached. `Backlog` keeps up
/// to `capacity` pushes per known session, dropping the oldest on overflow,
/// and flushes them right after the next `connected` frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Write to the live channel or discard.
    #[default]
    BestEffort,
    /// Buffer for offline sessions.
    Backlog {
        /// Maximum buffered pushes per session.
        capacity: usize,
    },
}

/// Bounded per-session queues of undelivered frames.
///
/// Holding a queue's entry also serializes pushes against attachment for that
/// session, which is what keeps backlog frames ahead of newer pushes.
pub(crate) struct Backlog {
    queues: DashMap<SessionId, VecDeque<Frame>>,
    capacity: usize,
}

impl Backlog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lock the queue for `session_id`, creating it if absent.
    pub(crate) fn lock(&self, session_id: &SessionId) -> RefMut<'_, SessionId, VecDeque<Frame>> {
        self.queues.entry(session_id.clone()).or_default()
    }

    /// Append, evicting the oldest frame when full. Returns whether a frame
    /// was evicted.
    pub(crate) fn enqueue(&self, queue: &mut VecDeque<Frame>, frame: Frame) -> bool {
        let evicted = if queue.len() >= self.capacity {
            let _ = queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(frame);
        evicted
    }

    /// Drop the entry for `session_id` if it holds nothing. Must be called
    /// after the lock from [`Backlog::lock`] is released.
    pub(crate) fn prune(&self, session_id: &SessionId) {
        let _ = self.queues.remove_if(session_id, |_, queue| queue.is_empty());
    }

    /// Forget everything buffered for `session_id`.
    pub(crate) fn discard(&self, session_id: &SessionId) -> usize {
        self.queues
            .remove(session_id)
            .map_or(0, |(_, queue)| queue.len())
    }

    /// Frames buffered for `session_id`.
    pub(crate) fn pending(&self, session_id: &SessionId) -> usize {
        self.queues.get(session_id).map_or(0, |queue| queue.len())
    }
}
