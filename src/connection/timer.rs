//! Cancellable timers that post events back into the daemon loop

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::events::Event;

/// A pending timer. Dropping it cancels it.
#[derive(Debug)]
pub struct Timer {
    task: JoinHandle<()>,
}

impl Timer {
    /// Post `event` once after `delay`
    pub fn after(delay: Duration, tx: mpsc::Sender<Event>, event: Event) -> Self {
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
        Self { task }
    }

    /// Post `event` every `period`, first firing one period from now
    pub fn every(period: Duration, tx: mpsc::Sender<Event>, event: Event) -> Self {
        let task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn cancel(self) {}
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
