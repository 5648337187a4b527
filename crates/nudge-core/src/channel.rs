//! Output channels and the frames written to them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::ChannelError;
use crate::ids::{ChannelId, SessionId};

/// What a proactive message is about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Proactive chat nudge.
    #[default]
    Nudge,
    /// Daily insight.
    Insight,
}

/// A proactive message handed to the dispatcher by a trigger source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Message category.
    #[serde(default)]
    pub kind: MessageKind,
    /// Text shown to the user.
    pub content: String,
}

impl PushMessage {
    /// A nudge carrying `content`.
    pub fn nudge(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Nudge,
            content: content.into(),
        }
    }

    /// An insight carrying `content`.
    pub fn insight(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Insight,
            content: content.into(),
        }
    }
}

/// One discrete, independently parseable unit on the event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame on every stream.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Session the stream is attached to.
        session_id: SessionId,
        /// Channel carrying this stream.
        channel_id: ChannelId,
        /// When the stream was attached.
        timestamp: DateTime<Utc>,
    },
    /// Server-initiated message.
    #[serde(rename_all = "camelCase")]
    Push {
        /// Target session.
        session_id: SessionId,
        /// Message category.
        kind: MessageKind,
        /// Message text.
        content: String,
        /// When the push was issued.
        timestamp: DateTime<Utc>,
    },
}

impl Frame {
    /// Acknowledgment frame for a freshly attached channel.
    pub fn connected(session_id: SessionId, channel_id: ChannelId) -> Self {
        Self::Connected {
            session_id,
            channel_id,
            timestamp: Utc::now(),
        }
    }

    /// Frame carrying a proactive message.
    pub fn push(session_id: SessionId, message: PushMessage) -> Self {
        Self::Push {
            session_id,
            kind: message.kind,
            content: message.content,
            timestamp: Utc::now(),
        }
    }

    /// Discriminator, also used as the SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Push { .. } => "push",
        }
    }

    /// Session this frame belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Connected { session_id, .. } | Self::Push { session_id, .. } => session_id,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Write handle for one client connection's event stream.
///
/// The connection task owns the receiving half. The registry only holds an
/// `Arc<Channel>` for writing; dropping every `Arc` closes the stream.
pub struct Channel {
    id: ChannelId,
    tx: mpsc::Sender<Frame>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Channel {
    /// Open a bounded channel holding at most `capacity` undelivered frames.
    pub fn open(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Arc::new(Self {
            id: ChannelId::new(),
            tx,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (channel, rx)
    }

    /// Channel identity.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Enqueue a frame without waiting.
    pub fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        match self.tx.try_send(frame) {
            Ok(()) => {
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => ChannelError::Full,
                    mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
                })
            }
        }
    }

    /// Whether the reading side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Frames successfully enqueued.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames rejected because the channel was full or closed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
