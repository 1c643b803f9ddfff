//! Connection link state machine
//!
//! A connection moves Joining -> Ready, drops into PendingCheck on a
//! disconnect, and either returns to Ready or gets released. Every status
//! change of the current connection goes through [`LinkPhase::on_status`].

use crate::platform::ConnectionStatus;

/// Phase of the connection the daemon currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Waiting for the first Ready (or a failure)
    Joining,
    /// Established and watched for drops
    Ready,
    /// Dropped; waiting out the grace window before deciding
    PendingCheck,
}

/// What the daemon reports about its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Never connected
    Idle,
    Joining,
    Ready,
    PendingCheck,
    /// Last connection was torn down and nothing replaced it
    Destroyed,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => write!(f, "Idle"),
            LinkState::Joining => write!(f, "Joining"),
            LinkState::Ready => write!(f, "Ready"),
            LinkState::PendingCheck => write!(f, "PendingCheck"),
            LinkState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

impl From<LinkPhase> for LinkState {
    fn from(phase: LinkPhase) -> Self {
        match phase {
            LinkPhase::Joining => LinkState::Joining,
            LinkPhase::Ready => LinkState::Ready,
            LinkPhase::PendingCheck => LinkState::PendingCheck,
        }
    }
}

/// Outcome of feeding a status change into the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do
    Stay,
    /// The join attempt reached Ready
    JoinSucceeded,
    /// The join attempt ended with the given status instead of Ready
    JoinFailed(ConnectionStatus),
    /// Established connection dropped: start the grace window
    BeginGrace,
    /// The connection moved during the grace window: end the wait early
    ResolveGrace,
    /// The handle is gone
    Released,
}

impl LinkPhase {
    /// Transition table for status changes of the current connection
    pub fn on_status(self, status: ConnectionStatus) -> Transition {
        use ConnectionStatus::*;

        match (self, status) {
            (LinkPhase::Joining, Ready) => Transition::JoinSucceeded,
            (LinkPhase::Joining, Disconnected | Destroyed) => Transition::JoinFailed(status),
            (LinkPhase::Joining, Signalling | Connecting) => Transition::Stay,

            (LinkPhase::Ready, Disconnected) => Transition::BeginGrace,
            (LinkPhase::Ready, Destroyed) => Transition::Released,
            (LinkPhase::Ready, Signalling | Connecting | Ready) => Transition::Stay,

            (LinkPhase::PendingCheck, Signalling | Connecting | Ready) => Transition::ResolveGrace,
            (LinkPhase::PendingCheck, Destroyed) => Transition::Released,
            (LinkPhase::PendingCheck, Disconnected) => Transition::Stay,
        }
    }
}
