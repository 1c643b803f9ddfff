//! Ownership of the one live voice connection
//!
//! The manager performs joins and leaves and decides, after every drop,
//! whether the owner squeezed the agent out or the network failed.

mod error;
mod link;
mod listener;
mod manager;
mod timer;

pub use error::{FailureClass, JoinAttempt, JoinFailure, Refusal};
pub use link::ActiveLink;
pub use manager::{ConnectionManager, StatusReport};
pub use timer::Timer;

/// Identity of one connection handle over the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}
