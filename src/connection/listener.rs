//! Status subscription for one connection handle

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::events::Event;
use crate::platform::VoiceConnection;

use super::ConnectionId;

/// Forwards every status change of one handle into the daemon loop, tagged
/// with the connection id. Attached once per handle, detached once.
#[derive(Debug)]
pub struct StatusListener {
    task: JoinHandle<()>,
}

impl StatusListener {
    pub fn attach(id: ConnectionId, handle: &dyn VoiceConnection, tx: mpsc::Sender<Event>) -> Self {
        let mut rx = handle.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(status) => {
                        trace!(connection = %id, %status, "status change");
                        if tx.send(Event::Status { id, status }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(connection = %id, skipped = n, "status listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn detach(self) {}
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
