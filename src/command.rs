//! Text commands typed by the owner
//!
//! `&povv` resumes and joins, `!vc pause` pauses and leaves, `!vc status`
//! reports. Matching is case-insensitive on the trimmed message. The
//! triggering message is deleted; a failed delete is ignored.

use tracing::{debug, info};

use crate::connection::{ConnectionManager, StatusReport};
use crate::events::IncomingMessage;
use crate::platform::{UserId, VoiceGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Resume,
    Pause,
    Status,
}

impl Command {
    pub fn parse(content: &str) -> Option<Self> {
        match content.trim().to_lowercase().as_str() {
            "&povv" => Some(Command::Resume),
            "!vc pause" => Some(Command::Pause),
            "!vc status" => Some(Command::Status),
            _ => None,
        }
    }
}

/// Result of running a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Resumed,
    Paused,
    Status(StatusReport),
}

pub struct CommandDispatcher {
    owner: UserId,
}

impl CommandDispatcher {
    pub fn new(owner: UserId) -> Self {
        Self { owner }
    }

    pub async fn dispatch(
        &self,
        message: &IncomingMessage,
        manager: &mut ConnectionManager,
        gateway: &dyn VoiceGateway,
    ) -> Option<CommandOutcome> {
        if message.author != self.owner {
            return None;
        }
        let command = Command::parse(&message.content)?;
        debug!(?command, "command received");

        let outcome = match command {
            Command::Resume => {
                manager.resume();
                info!("resume requested, joining");
                manager.attempt_join().await;
                CommandOutcome::Resumed
            }
            Command::Pause => {
                manager.pause("pause command");
                CommandOutcome::Paused
            }
            Command::Status => {
                let report = manager.status_report();
                info!(
                    paused = report.paused,
                    retrying = report.retrying,
                    link = %report.link,
                    "status: {report}"
                );
                CommandOutcome::Status(report)
            }
        };

        if let Err(e) = gateway.delete_message(message.channel, message.id).await {
            debug!(error = %e, "could not delete command message");
        }
        Some(outcome)
    }
}
