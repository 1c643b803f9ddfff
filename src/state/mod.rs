//! Session state and the connection link state machine
//!
//! - `SessionState`: the one set of flags the daemon runs on (paused,
//!   joining, retrying) plus the single active connection
//! - `LinkPhase`: Joining, Ready and PendingCheck, with the transition
//!   table applied to every status change

mod machine;
mod session;

pub use machine::{LinkPhase, LinkState, Transition};
pub use session::SessionState;
