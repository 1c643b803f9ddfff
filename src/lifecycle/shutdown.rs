//! Signal handling for graceful shutdown
//!
//! SIGINT and SIGTERM both end the daemon loop so the held voice connection
//! is left and the platform session closed before the process exits.

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// The signal that asked the daemon to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Interrupt,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopSignal::Terminate => write!(f, "SIGTERM"),
            StopSignal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a shutdown signal handler; handlers are installed on `wait`
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal and report which one arrived
    pub async fn wait(&self) -> io::Result<StopSignal> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let received = tokio::select! {
            _ = sigterm.recv() => StopSignal::Terminate,
            _ = sigint.recv() => StopSignal::Interrupt,
        };
        debug!(signal = %received, "stop signal received");
        Ok(received)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
