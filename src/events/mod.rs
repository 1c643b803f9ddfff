//! Events consumed by the daemon loop
//!
//! [`PlatformEvent`]s arrive from the session client. [`Event`]s are posted
//! by the daemon to itself: timer firings and connection status changes.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::platform::{ChannelId, ConnectionStatus, GuildId, MessageId, UserId};

/// A voice-state change for some user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub user: UserId,
    pub guild: GuildId,
    /// Channel before the change, `None` when not in voice
    pub old_channel: Option<ChannelId>,
    /// Channel after the change, `None` when not in voice
    pub new_channel: Option<ChannelId>,
}

/// A text message seen by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: UserId,
    pub content: String,
}

/// Events delivered by the platform session client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    VoiceStateUpdate(VoiceStateUpdate),
    MessageCreate(IncomingMessage),
}

/// Internal events, each one a scheduled continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A connection reported a new status
    Status {
        id: ConnectionId,
        status: ConnectionStatus,
    },

    /// Join attempt did not settle in time
    JoinTimedOut { id: ConnectionId },

    /// Grace window after a disconnect ran out. `window` counts the grace
    /// windows of one connection; only the armed one is honoured.
    GraceElapsed { id: ConnectionId, window: u64 },

    /// Delayed rejoin after a network-level drop
    RejoinDue { generation: u64 },

    /// Periodic retry while the channel is full
    RetryTick { generation: u64 },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Status { id, status } => write!(f, "STATUS {} ({})", status, id),
            Event::JoinTimedOut { id } => write!(f, "JOIN_TIMED_OUT ({})", id),
            Event::GraceElapsed { id, window } => {
                write!(f, "GRACE_ELAPSED ({} window {})", id, window)
            }
            Event::RejoinDue { generation } => write!(f, "REJOIN_DUE (#{})", generation),
            Event::RetryTick { generation } => write!(f, "RETRY_TICK (#{})", generation),
        }
    }
}
