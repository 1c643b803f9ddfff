//! Owner-presence decisions
//!
//! Watches voice-state changes of the controlled identity in the target
//! guild. The owner leaving voice resumes the agent immediately; the owner
//! moving somewhere else pauses it. The owner joining the target channel is
//! left to the connection manager's squeeze check.

use tracing::{debug, error, info, warn};

use crate::connection::ConnectionManager;
use crate::events::VoiceStateUpdate;
use crate::platform::{PlatformError, TargetLocation, UserId};

/// What the arbiter did with an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ignored,
    /// Our own teardown echoed back as a voice-state change
    OwnDeparture,
    Resumed,
    Paused,
}

pub struct PresenceArbiter {
    target: TargetLocation,
    owner: UserId,
}

impl PresenceArbiter {
    pub fn new(target: TargetLocation, owner: UserId) -> Self {
        Self { target, owner }
    }

    /// One check before any event: stay paused if the owner is already in
    /// the target channel, otherwise join
    pub async fn initialize(&self, manager: &mut ConnectionManager) {
        match manager.fetch_target().await {
            Ok(channel) if channel.has_member(self.owner) => {
                manager.hold("owner already in target channel");
            }
            Ok(channel) => {
                info!(
                    channel = %channel.name,
                    members = channel.members.len(),
                    "target resolved"
                );
                manager.attempt_join().await;
            }
            Err(err @ (PlatformError::GuildNotFound(_) | PlatformError::ChannelNotFound(_))) => {
                error!(error = %err, "startup check failed");
                manager.report_fatal(&err);
            }
            Err(err) => {
                warn!(error = %err, "startup check failed, trying to join anyway");
                manager.attempt_join().await;
            }
        }
    }

    pub async fn on_voice_state(
        &self,
        update: &VoiceStateUpdate,
        manager: &mut ConnectionManager,
    ) -> Decision {
        if update.user != self.owner || update.guild != self.target.guild {
            return Decision::Ignored;
        }
        if update.old_channel == update.new_channel {
            return Decision::Ignored;
        }

        // only the update right after our own leave can be its echo
        let echo = manager.take_departure_echo();

        match update.new_channel {
            None => {
                if echo && update.old_channel == Some(self.target.channel) {
                    debug!("voice-state change from our own leave");
                    return Decision::OwnDeparture;
                }
                info!("owner left voice, resuming");
                manager.resume();
                manager.attempt_join().await;
                Decision::Resumed
            }
            Some(channel) if channel == self.target.channel => Decision::Ignored,
            Some(channel) => {
                if manager.session().paused() {
                    return Decision::Ignored;
                }
                info!(%channel, "owner moved to another channel");
                manager.pause("owner in another channel");
                Decision::Paused
            }
        }
    }
}
