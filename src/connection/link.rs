//! The connection currently held, together with everything attached to it

use crate::platform::{ConnectionStatus, VoiceConnection};
use crate::state::LinkPhase;

use super::listener::StatusListener;
use super::timer::Timer;
use super::ConnectionId;

pub struct ActiveLink {
    id: ConnectionId,
    handle: Box<dyn VoiceConnection>,
    listener: Option<StatusListener>,
    phase: LinkPhase,
    /// Join result deadline, armed while Joining
    deadline: Option<Timer>,
    /// Grace window and its number, armed while PendingCheck
    grace: Option<(u64, Timer)>,
}

impl ActiveLink {
    pub fn new(
        id: ConnectionId,
        handle: Box<dyn VoiceConnection>,
        listener: StatusListener,
        deadline: Timer,
    ) -> Self {
        Self {
            id,
            handle,
            listener: Some(listener),
            phase: LinkPhase::Joining,
            deadline: Some(deadline),
            grace: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn status(&self) -> ConnectionStatus {
        self.handle.status()
    }

    pub fn mark_ready(&mut self) {
        self.deadline = None;
        self.grace = None;
        self.phase = LinkPhase::Ready;
    }

    pub fn begin_grace(&mut self, window: u64, grace: Timer) {
        self.phase = LinkPhase::PendingCheck;
        self.grace = Some((window, grace));
    }

    /// Number of the grace window still armed, if any
    pub fn grace_window(&self) -> Option<u64> {
        self.grace.as_ref().map(|(window, _)| *window)
    }

    pub fn end_grace(&mut self) {
        self.grace = None;
    }

    /// Detach the listener, cancel timers, then destroy the handle
    pub fn release(mut self) {
        self.deadline = None;
        self.grace = None;
        if let Some(listener) = self.listener.take() {
            listener.detach();
        }
        self.handle.destroy();
    }
}

impl std::fmt::Debug for ActiveLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveLink")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .finish()
    }
}
