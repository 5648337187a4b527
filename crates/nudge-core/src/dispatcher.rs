//! Push dispatch and the connection lifecycle around it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::channel::{Channel, Frame, PushMessage};
use crate::delivery::{Backlog, DeliveryPolicy};
use crate::errors::ChannelError;
use crate::identity::Identity;
use crate::ids::SessionId;
use crate::registry::ChannelRegistry;
use crate::session::{Session, SessionStore};

/// Pushes by outcome (counter, labels: outcome).
pub const PUSH_TOTAL: &str = "push_total";
/// Stream attachments total (counter).
pub const STREAM_CONNECTIONS_TOTAL: &str = "stream_connections_total";
/// Currently attached streams (gauge).
pub const STREAM_CONNECTIONS_ACTIVE: &str = "stream_connections_active";
/// Pushes discarded from a full backlog (counter).
pub const BACKLOG_OVERFLOW_TOTAL: &str = "backlog_overflow_total";

/// Why a push was not delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// No live channel for the session.
    NoChannel,
    /// The live channel's queue was full.
    ChannelFull,
    /// The live channel was broken; it has been deregistered.
    ChannelClosed,
}

impl DropReason {
    /// Short classification string for logs and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoChannel => "no_channel",
            Self::ChannelFull => "channel_full",
            Self::ChannelClosed => "channel_closed",
        }
    }
}

/// Result of [`PushDispatcher::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Written to the session's live channel.
    Delivered,
    /// Held in the session backlog until it reattaches.
    Queued,
    /// Discarded.
    Dropped(DropReason),
}

impl PushOutcome {
    /// Short classification string for logs and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Queued => "queued",
            Self::Dropped(_) => "dropped",
        }
    }

    /// Whether the message reached a channel.
    pub fn is_delivered(self) -> bool {
        self == Self::Delivered
    }
}

enum Write {
    Written,
    NoChannel(Frame),
    Failed(DropReason),
}

/// Routes proactive messages to live channels and manages attachment.
///
/// Constructed once at startup and shared by handle with every connection
/// and trigger source.
pub struct PushDispatcher {
    store: Arc<SessionStore>,
    registry: Arc<ChannelRegistry>,
    backlog: Option<Backlog>,
}

impl PushDispatcher {
    /// Create a dispatcher over a store and registry.
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<ChannelRegistry>,
        policy: DeliveryPolicy,
    ) -> Self {
        let backlog = match policy {
            DeliveryPolicy::BestEffort => None,
            DeliveryPolicy::Backlog { capacity } => Some(Backlog::new(capacity)),
        };
        Self {
            store,
            registry,
            backlog,
        }
    }

    /// The session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The channel registry.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Active delivery policy.
    pub fn policy(&self) -> DeliveryPolicy {
        self.backlog
            .as_ref()
            .map_or(DeliveryPolicy::BestEffort, |b| DeliveryPolicy::Backlog {
                capacity: b.capacity(),
            })
    }

    /// Pushes waiting in the backlog for `session_id`.
    pub fn pending(&self, session_id: &SessionId) -> usize {
        self.backlog.as_ref().map_or(0, |b| b.pending(session_id))
    }

    /// Deliver `message` to the session's live channel, if any.
    ///
    /// Never blocks and never fails: the outcome is informational.
    #[instrument(skip_all, fields(session_id = %session_id, kind = ?message.kind))]
    pub fn push(&self, session_id: &SessionId, message: PushMessage) -> PushOutcome {
        let frame = Frame::push(session_id.clone(), message);
        let _ = self.store.touch(session_id);

        let outcome = match &self.backlog {
            None => match self.write(session_id, frame) {
                Write::Written => PushOutcome::Delivered,
                Write::NoChannel(_) => PushOutcome::Dropped(DropReason::NoChannel),
                Write::Failed(reason) => PushOutcome::Dropped(reason),
            },
            Some(backlog) => self.push_buffered(backlog, session_id, frame),
        };

        counter!(PUSH_TOTAL, "outcome" => outcome.as_str()).increment(1);
        match outcome {
            PushOutcome::Delivered => debug!("push delivered"),
            PushOutcome::Queued => debug!("push queued for offline session"),
            PushOutcome::Dropped(reason) => debug!(reason = reason.as_str(), "push dropped"),
        }
        outcome
    }

    fn push_buffered(&self, backlog: &Backlog, session_id: &SessionId, frame: Frame) -> PushOutcome {
        let mut queue = backlog.lock(session_id);
        let outcome = match self.write(session_id, frame) {
            Write::Written => PushOutcome::Delivered,
            Write::NoChannel(frame) if self.store.contains(session_id) => {
                if backlog.enqueue(&mut queue, frame) {
                    counter!(BACKLOG_OVERFLOW_TOTAL).increment(1);
                    warn!(session_id = %session_id, "backlog full, oldest push discarded");
                }
                PushOutcome::Queued
            }
            Write::NoChannel(_) => PushOutcome::Dropped(DropReason::NoChannel),
            Write::Failed(reason) => PushOutcome::Dropped(reason),
        };
        drop(queue);
        backlog.prune(session_id);
        outcome
    }

    fn write(&self, session_id: &SessionId, frame: Frame) -> Write {
        let Some(channel) = self.registry.lookup(session_id) else {
            return Write::NoChannel(frame);
        };
        match channel.send(frame) {
            Ok(()) => Write::Written,
            Err(ChannelError::Full) => {
                warn!(
                    session_id = %session_id,
                    channel = %channel.id(),
                    dropped = channel.dropped_count(),
                    "channel queue full, dropping push"
                );
                Write::Failed(DropReason::ChannelFull)
            }
            Err(ChannelError::Closed) => {
                let removed = self.registry.deregister(session_id, &channel);
                warn!(
                    session_id = %session_id,
                    channel = %channel.id(),
                    removed,
                    "channel broken, deregistered"
                );
                Write::Failed(DropReason::ChannelClosed)
            }
        }
    }

    /// Attach a new output channel to `session_id`.
    ///
    /// Creates the session if needed, opens a channel with room for
    /// `capacity` frames, enqueues the `connected` acknowledgment, installs
    /// the channel (replacing any previous one) and flushes any backlog. The
    /// acknowledgment is enqueued before the channel becomes visible, so it is
    /// always the first frame.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub fn attach(&self, session_id: SessionId, identity: Identity, capacity: usize) -> Attachment {
        let session = self.store.get_or_create(&session_id, identity);

        let capacity = match &self.backlog {
            Some(backlog) => capacity.max(backlog.capacity() + 1),
            None => capacity,
        };
        let (channel, receiver) = Channel::open(capacity);
        let _ = channel.send(Frame::connected(session_id.clone(), channel.id().clone()));

        let replaced = match &self.backlog {
            None => self.registry.register(&session_id, Arc::clone(&channel)),
            Some(backlog) => {
                let mut queue = backlog.lock(&session_id);
                let replaced = self.registry.register(&session_id, Arc::clone(&channel));
                let flushed = queue.len();
                while let Some(frame) = queue.pop_front() {
                    if channel.send(frame).is_err() {
                        break;
                    }
                }
                drop(queue);
                backlog.prune(&session_id);
                if flushed > 0 {
                    debug!(flushed, "backlog flushed to new channel");
                }
                replaced
            }
        };

        counter!(STREAM_CONNECTIONS_TOTAL).increment(1);
        gauge!(STREAM_CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            channel = %channel.id(),
            user_id = %session.user_id,
            replaced = replaced.is_some(),
            "stream attached"
        );

        let guard = ConnectionGuard {
            session_id,
            channel,
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            released: AtomicBool::new(false),
        };
        Attachment {
            session,
            receiver,
            guard,
        }
    }

    /// Evict sessions idle longer than `max_idle` that have no live channel,
    /// along with anything buffered for them.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let evicted = self
            .store
            .evict_idle(max_idle, |id| self.registry.contains(id));
        if let Some(backlog) = &self.backlog {
            for id in &evicted {
                let discarded = backlog.discard(id);
                if discarded > 0 {
                    debug!(session_id = %id, discarded, "backlog discarded with session");
                }
            }
        }
        evicted
    }
}

/// A live attachment: the reading half of the channel plus its release guard.
pub struct Attachment {
    session: Session,
    receiver: mpsc::Receiver<Frame>,
    guard: ConnectionGuard,
}

impl Attachment {
    /// Session record as of attachment.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The guard that releases this attachment.
    pub fn guard(&self) -> &ConnectionGuard {
        &self.guard
    }

    /// Wait for the next frame.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Take the next frame if one is ready.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Split into the frame receiver and the release guard.
    pub fn into_parts(self) -> (mpsc::Receiver<Frame>, ConnectionGuard) {
        (self.receiver, self.guard)
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("session_id", &self.guard.session_id)
            .field("channel", &self.guard.channel.id())
            .finish_non_exhaustive()
    }
}

/// Releases a channel binding exactly once.
///
/// [`ConnectionGuard::release`] is idempotent and also runs on drop, so every
/// exit path of a connection (client abort, network failure, server shutdown)
/// deregisters, and racing exit paths deregister only once.
pub struct ConnectionGuard {
    session_id: SessionId,
    channel: Arc<Channel>,
    store: Arc<SessionStore>,
    registry: Arc<ChannelRegistry>,
    released: AtomicBool,
}

impl ConnectionGuard {
    /// Session this connection is attached to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The channel this guard owns.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Whether [`ConnectionGuard::release`] has already run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Deregister the channel (only if still current) and record activity.
    ///
    /// Returns `true` on the first call, `false` on every later call.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let removed = self.registry.deregister(&self.session_id, &self.channel);
        let _ = self.store.touch(&self.session_id);
        gauge!(STREAM_CONNECTIONS_ACTIVE).decrement(1.0);
        info!(
            session_id = %self.session_id,
            channel = %self.channel.id(),
            removed,
            delivered = self.channel.delivered_count(),
            "stream detached"
        );
        true
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
