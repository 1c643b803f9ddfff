//! Boundary to the chat platform and its voice subsystem
//!
//! The session client (auth, gateway, REST) and the voice media transport
//! live outside this crate. The daemon only talks to them through
//! [`VoiceGateway`] and the [`VoiceConnection`] handles it hands out.

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Snowflake-style identifier, shared by users, guilds, channels and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake(pub u64);

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type UserId = Snowflake;
pub type GuildId = Snowflake;
pub type ChannelId = Snowflake;
pub type MessageId = Snowflake;

/// Where the agent is supposed to sit. Loaded once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetLocation {
    pub guild: GuildId,
    pub channel: ChannelId,
}

/// Status reported by a live voice connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Signalling => write!(f, "signalling"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ready => write!(f, "ready"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Freshly fetched view of a voice channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    /// Occupancy limit; `None` or `Some(0)` means unlimited
    pub user_limit: Option<u32>,
    pub members: Vec<UserId>,
}

impl ChannelSnapshot {
    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    /// True when the channel has a numeric limit and is at or over it
    pub fn is_full(&self) -> bool {
        match self.user_limit {
            Some(limit) if limit > 0 => self.members.len() >= limit as usize,
            _ => false,
        }
    }
}

/// Options passed to the voice subsystem when opening a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl Default for JoinOptions {
    /// Muted but listening
    fn default() -> Self {
        Self {
            self_mute: true,
            self_deaf: false,
        }
    }
}

/// Errors surfaced by the gateway adapter
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("guild {0} not found")]
    GuildNotFound(GuildId),

    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("request failed: {0}")]
    Request(String),
}

/// Opaque handle to one voice connection
///
/// Status changes are published on a broadcast stream; `status()` always
/// returns the latest value.
pub trait VoiceConnection: Send + Sync {
    fn status(&self) -> ConnectionStatus;

    fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus>;

    /// Tear the connection down. Must be safe to call more than once.
    fn destroy(&self);
}

/// Session-level operations of the chat platform
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// The identity this session is logged in as (the owner's account)
    fn self_id(&self) -> UserId;

    /// Fetch channel metadata and membership from the platform, bypassing
    /// any local cache
    async fn fetch_channel(&self, target: TargetLocation) -> Result<ChannelSnapshot, PlatformError>;

    /// Open a voice connection to the target channel
    async fn connect(
        &self,
        target: TargetLocation,
        options: JoinOptions,
    ) -> Result<Box<dyn VoiceConnection>, PlatformError>;

    /// Whatever connection the voice subsystem still tracks for `guild`
    fn existing_connection(&self, guild: GuildId) -> Option<Box<dyn VoiceConnection>>;

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError>;

    /// Release the platform session
    async fn close(&self);
}
