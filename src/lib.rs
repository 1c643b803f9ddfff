//! voice-warden: keeps an account parked in one voice channel
//!
//! The agent joins the configured channel muted, stays there through
//! network drops and full-channel periods, and steps aside whenever the
//! account's owner is present in voice themselves:
//! - `connection`: join/leave and the squeeze check after every drop
//! - `arbiter`: owner-presence decisions from voice-state changes
//! - `retry`: periodic retry while the channel is full
//! - `notify`: webhook alerts
//! - `command`: `&povv`, `!vc pause`, `!vc status`
//!
//! Platform session and voice transport are supplied by the embedder
//! through [`platform::VoiceGateway`].

pub mod arbiter;
pub mod command;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod events;
pub mod lifecycle;
pub mod notify;
pub mod platform;
pub mod retry;
pub mod state;

pub use config::Config;
pub use daemon::{init_tracing, run, run_until};
