//! Process-wide session flags
//!
//! Owned by the connection manager. Invariants held here:
//! - at most one active connection
//! - `paused` and `retrying` are never both true
//! - `joining` marks the single join attempt in flight

use tracing::debug;

use crate::connection::{ActiveLink, ConnectionId};

use super::machine::LinkState;

#[derive(Default)]
pub struct SessionState {
    paused: bool,
    joining: bool,
    retrying: bool,
    active: Option<ActiveLink>,
    /// Reported when there is no active connection
    resting: LinkState,
    /// Set when we tore down a live connection ourselves
    departure_pending: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn joining(&self) -> bool {
        self.joining
    }

    pub fn retrying(&self) -> bool {
        self.retrying
    }

    pub fn link_state(&self) -> LinkState {
        self.active
            .as_ref()
            .map(|link| link.phase().into())
            .unwrap_or(self.resting)
    }

    pub fn current_id(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(ActiveLink::id)
    }

    pub fn has_connection(&self) -> bool {
        self.active.is_some()
    }

    /// Enter the paused state. Retry mode has to be left first.
    pub fn pause(&mut self) -> bool {
        debug_assert!(!self.retrying, "pausing while retry mode is armed");
        self.retrying = false;
        let changed = !self.paused;
        self.paused = true;
        changed
    }

    pub fn resume(&mut self) -> bool {
        let changed = self.paused;
        self.paused = false;
        self.departure_pending = false;
        changed
    }

    /// Claim the join slot. Returns false if an attempt is already in flight.
    pub fn begin_join(&mut self) -> bool {
        if self.joining {
            return false;
        }
        self.joining = true;
        true
    }

    pub fn end_join(&mut self) {
        self.joining = false;
    }

    /// Flip retry mode. Refuses to arm it while paused.
    pub fn set_retrying(&mut self, retrying: bool) -> bool {
        if retrying && self.paused {
            debug!("not entering retry mode while paused");
            return false;
        }
        self.retrying = retrying;
        true
    }

    /// Make `link` the active connection. The previous one must already be gone.
    pub fn install(&mut self, link: ActiveLink) {
        debug_assert!(self.active.is_none(), "installing over a live connection");
        self.active = Some(link);
    }

    pub fn link(&self, id: ConnectionId) -> Option<&ActiveLink> {
        self.active.as_ref().filter(|link| link.id() == id)
    }

    /// The active link, but only if it is still `id`
    pub fn link_mut(&mut self, id: ConnectionId) -> Option<&mut ActiveLink> {
        self.active.as_mut().filter(|link| link.id() == id)
    }

    pub fn take_active(&mut self) -> Option<ActiveLink> {
        let link = self.active.take();
        if link.is_some() {
            self.resting = LinkState::Destroyed;
        }
        link
    }

    /// Take the active link only if `id` has not been superseded
    pub fn take_if_current(&mut self, id: ConnectionId) -> Option<ActiveLink> {
        if self.current_id() == Some(id) {
            self.take_active()
        } else {
            None
        }
    }

    pub fn expect_departure(&mut self) {
        self.departure_pending = true;
    }

    pub fn clear_departure(&mut self) {
        self.departure_pending = false;
    }

    /// Consume the marker left by our own teardown
    pub fn take_departure(&mut self) -> bool {
        std::mem::take(&mut self.departure_pending)
    }
}
