//! Retry mode for a full channel
//!
//! While armed, a repeating timer posts [`Event::RetryTick`] into the daemon
//! loop and the connection manager answers each tick with a join attempt.
//! A failed attempt simply waits for the next tick; a successful one exits
//! retry mode.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::Timer;
use crate::events::Event;
use crate::notify::{NotificationKind, Notifier};
use crate::state::SessionState;

pub struct RetryScheduler {
    interval: Duration,
    notifier: Notifier,
    tx: mpsc::Sender<Event>,
    timer: Option<Timer>,
    /// Bumped every time retry mode is armed; ticks carry it
    generation: u64,
}

impl RetryScheduler {
    pub fn new(interval: Duration, notifier: Notifier, tx: mpsc::Sender<Event>) -> Self {
        Self {
            interval,
            notifier,
            tx,
            timer: None,
            generation: 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// True for ticks of the timer that is currently armed
    pub fn is_current(&self, generation: u64) -> bool {
        self.timer.is_some() && self.generation == generation
    }

    /// Arm retry mode. No-op if already retrying or paused.
    pub fn enter(&mut self, session: &mut SessionState, reason: &str) -> bool {
        if session.retrying() {
            debug!(reason, "already in retry mode");
            return false;
        }
        if !session.set_retrying(true) {
            return false;
        }

        warn!(
            reason,
            interval_ms = self.interval.as_millis() as u64,
            "entering retry mode"
        );
        self.notifier.notify(
            NotificationKind::Capacity,
            format!(
                "Target channel is unavailable: {reason}. Retrying every {}s.",
                self.interval.as_secs_f32()
            ),
        );
        self.generation += 1;
        let tick = Event::RetryTick {
            generation: self.generation,
        };
        self.timer = Some(Timer::every(self.interval, self.tx.clone(), tick));
        true
    }

    /// Disarm retry mode. The timer is cancelled even if the flag was clear.
    pub fn exit(&mut self, session: &mut SessionState, success: bool) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if !session.retrying() {
            return false;
        }
        session.set_retrying(false);

        if success {
            info!("left retry mode, channel joined");
            self.notifier
                .notify(NotificationKind::Recovered, "Rejoined the target channel.");
        } else {
            info!("retry mode cancelled");
        }
        true
    }
}
