//! Join failure taxonomy

use crate::platform::{ChannelId, GuildId, PlatformError};

/// How a failure is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Target cannot be resolved; needs an operator
    Fatal,
    /// Channel at its occupancy limit; handled by retry mode
    Capacity,
    /// Network trouble; handled by a delayed rejoin
    Transient,
}

/// Why a join attempt did not produce a Ready connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinFailure {
    #[error("guild {0} not found")]
    GuildNotFound(GuildId),

    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("channel full ({members}/{limit})")]
    ChannelFull { members: usize, limit: u32 },

    #[error("connection did not become ready in time")]
    Timeout,

    #[error("connection dropped before becoming ready")]
    Disconnected,

    #[error("platform request failed: {0}")]
    Platform(String),
}

impl JoinFailure {
    pub fn class(&self) -> FailureClass {
        match self {
            JoinFailure::GuildNotFound(_) | JoinFailure::ChannelNotFound(_) => FailureClass::Fatal,
            JoinFailure::ChannelFull { .. } => FailureClass::Capacity,
            JoinFailure::Timeout | JoinFailure::Disconnected | JoinFailure::Platform(_) => {
                FailureClass::Transient
            }
        }
    }
}

impl From<PlatformError> for JoinFailure {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::GuildNotFound(id) => JoinFailure::GuildNotFound(id),
            PlatformError::ChannelNotFound(id) => JoinFailure::ChannelNotFound(id),
            PlatformError::Request(message) => JoinFailure::Platform(message),
        }
    }
}

/// Why `attempt_join` did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Paused,
    InFlight,
}

/// Immediate result of `attempt_join`
///
/// A started attempt settles later, on Ready, on a drop, or on the join
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinAttempt {
    Refused(Refusal),
    Failed(JoinFailure),
    Started(super::ConnectionId),
}
