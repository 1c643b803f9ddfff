//! Join, leave, and the squeeze check
//!
//! The manager owns [`SessionState`] and is the only writer of the active
//! connection. Everything that happens to a connection arrives as an
//! [`Event`] carrying its [`ConnectionId`]; events for a connection that has
//! since been replaced are dropped.
//!
//! After a Ready connection reports Disconnected the manager cannot yet tell
//! a network drop from the owner taking the channel back, because the
//! platform's membership view lags the disconnect. It waits out a grace
//! window (ended early if the handle starts signalling or connecting again),
//! and if the handle is still down, fetches membership fresh. Owner present
//! means squeeze: pause and stay away. Owner absent means a real drop:
//! destroy the handle and rejoin after a short delay.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Timings;
use crate::events::Event;
use crate::notify::{NotificationKind, Notifier};
use crate::platform::{
    ChannelSnapshot, ConnectionStatus, JoinOptions, PlatformError, TargetLocation, UserId,
    VoiceGateway,
};
use crate::retry::RetryScheduler;
use crate::state::{LinkPhase, LinkState, SessionState, Transition};

use super::error::{FailureClass, JoinAttempt, JoinFailure, Refusal};
use super::link::ActiveLink;
use super::listener::StatusListener;
use super::timer::Timer;
use super::ConnectionId;

/// Snapshot answered by the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub paused: bool,
    pub retrying: bool,
    pub link: LinkState,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.paused { "PAUSED" } else { "RUNNING" };
        write!(f, "{mode}")?;
        if self.retrying {
            write!(f, " (retry mode)")?;
        }
        write!(f, ", link {}", self.link)
    }
}

pub struct ConnectionManager {
    target: TargetLocation,
    self_id: UserId,
    timings: Timings,
    gateway: Arc<dyn VoiceGateway>,
    notifier: Notifier,
    retry: RetryScheduler,
    session: SessionState,
    /// Pending delayed rejoin after a network drop, with its generation
    rejoin: Option<(u64, Timer)>,
    rejoin_generation: u64,
    grace_windows: u64,
    next_id: u64,
    tx: mpsc::Sender<Event>,
}

impl ConnectionManager {
    pub fn new(
        target: TargetLocation,
        timings: Timings,
        gateway: Arc<dyn VoiceGateway>,
        notifier: Notifier,
        tx: mpsc::Sender<Event>,
    ) -> Self {
        let retry = RetryScheduler::new(timings.retry_interval, notifier.clone(), tx.clone());
        Self {
            target,
            self_id: gateway.self_id(),
            timings,
            gateway,
            notifier,
            retry,
            session: SessionState::new(),
            rejoin: None,
            rejoin_generation: 0,
            grace_windows: 0,
            next_id: 0,
            tx,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn target(&self) -> TargetLocation {
        self.target
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            paused: self.session.paused(),
            retrying: self.session.retrying(),
            link: self.session.link_state(),
        }
    }

    /// Fresh channel metadata for the target
    pub async fn fetch_target(&self) -> Result<ChannelSnapshot, PlatformError> {
        self.gateway.fetch_channel(self.target).await
    }

    /// Try to get into the target channel
    ///
    /// Refused while paused or while another attempt is in flight. A
    /// started attempt settles on Ready, on a drop, or on the join deadline.
    pub async fn attempt_join(&mut self) -> JoinAttempt {
        if self.session.paused() {
            debug!("paused, skipping join");
            return JoinAttempt::Refused(Refusal::Paused);
        }
        if !self.session.begin_join() {
            debug!("join already in flight, dropping request");
            return JoinAttempt::Refused(Refusal::InFlight);
        }
        self.rejoin = None;

        match self.open_connection().await {
            Ok(id) => JoinAttempt::Started(id),
            Err(failure) => {
                self.session.end_join();
                self.on_join_failed(&failure);
                JoinAttempt::Failed(failure)
            }
        }
    }

    async fn open_connection(&mut self) -> Result<ConnectionId, JoinFailure> {
        let channel = self.fetch_target().await?;
        if channel.is_full() {
            return Err(JoinFailure::ChannelFull {
                members: channel.members.len(),
                limit: channel.user_limit.unwrap_or_default(),
            });
        }

        if let Some(previous) = self.session.take_active() {
            debug!(connection = %previous.id(), "superseding previous connection");
            self.release(previous);
        }

        let handle = self
            .gateway
            .connect(self.target, JoinOptions::default())
            .await?;

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let listener = StatusListener::attach(id, handle.as_ref(), self.tx.clone());
        let deadline = Timer::after(
            self.timings.join_timeout,
            self.tx.clone(),
            Event::JoinTimedOut { id },
        );
        let initial = handle.status();
        self.session
            .install(ActiveLink::new(id, handle, listener, deadline));
        info!(connection = %id, channel = %channel.name, "joining");

        // a status reached before the listener subscribed would otherwise be missed
        if matches!(
            initial,
            ConnectionStatus::Ready | ConnectionStatus::Disconnected | ConnectionStatus::Destroyed
        ) {
            self.on_joining_status(id, initial);
        }
        Ok(id)
    }

    fn on_joining_status(&mut self, id: ConnectionId, status: ConnectionStatus) {
        match LinkPhase::Joining.on_status(status) {
            Transition::JoinSucceeded => self.finish_join(id, Ok(())),
            Transition::JoinFailed(_) => self.finish_join(id, Err(JoinFailure::Disconnected)),
            _ => {}
        }
    }

    fn finish_join(&mut self, id: ConnectionId, result: Result<(), JoinFailure>) {
        match result {
            Ok(()) => {
                let Some(link) = self.session.link_mut(id) else {
                    return;
                };
                link.mark_ready();
                self.session.end_join();

                if self.session.paused() {
                    info!(connection = %id, "joined while paused, leaving again");
                    if let Some(link) = self.session.take_if_current(id) {
                        self.release(link);
                    }
                    return;
                }

                info!(connection = %id, "connected");
                self.rejoin = None;
                self.session.clear_departure();
                self.retry.exit(&mut self.session, true);
            }
            Err(failure) => {
                if let Some(link) = self.session.take_if_current(id) {
                    self.release(link);
                }
                self.on_join_failed(&failure);
            }
        }
    }

    fn on_join_failed(&mut self, failure: &JoinFailure) {
        match failure.class() {
            FailureClass::Fatal => {
                error!(error = %failure, "target cannot be resolved, staying idle");
                self.retry.exit(&mut self.session, false);
                self.notifier.notify(
                    NotificationKind::Error,
                    format!("Cannot join the target channel: {failure}"),
                );
            }
            FailureClass::Capacity => {
                info!(reason = %failure, "join refused");
                self.retry.enter(&mut self.session, &failure.to_string());
            }
            FailureClass::Transient => {
                warn!(error = %failure, "join failed");
                if !self.session.retrying() {
                    self.schedule_rejoin();
                }
            }
        }
    }

    /// Cancel retry mode and drop the connection, if any
    ///
    /// Falls back to whatever connection the voice subsystem still tracks
    /// for the guild. A second call finds nothing and does nothing.
    pub fn leave(&mut self) -> bool {
        self.retry.exit(&mut self.session, false);
        self.rejoin = None;

        if let Some(link) = self.session.take_active() {
            let id = link.id();
            // the platform already shows us in the channel once the join started
            if matches!(link.phase(), LinkPhase::Joining | LinkPhase::Ready) {
                self.session.expect_departure();
            }
            self.release(link);
            info!(connection = %id, "left voice channel");
            return true;
        }

        if let Some(orphan) = self.gateway.existing_connection(self.target.guild) {
            orphan.destroy();
            info!(guild = %self.target.guild, "destroyed untracked connection");
            return true;
        }

        debug!("not connected, nothing to leave");
        false
    }

    /// Pause and leave
    pub fn pause(&mut self, reason: &str) {
        self.retry.exit(&mut self.session, false);
        if self.session.pause() {
            info!(reason, "paused");
        }
        self.leave();
    }

    /// Mark paused without touching the connection (owner already present)
    pub fn hold(&mut self, reason: &str) {
        self.retry.exit(&mut self.session, false);
        self.rejoin = None;
        if self.session.pause() {
            info!(reason, "paused");
        }
    }

    /// Clear the pause and cancel retry mode; does not join by itself
    pub fn resume(&mut self) {
        self.retry.exit(&mut self.session, false);
        if self.session.resume() {
            info!("resumed");
        }
    }

    /// Consume the marker left by tearing down a live connection ourselves
    pub fn take_departure_echo(&mut self) -> bool {
        self.session.take_departure()
    }

    /// Target cannot be resolved at startup
    pub fn report_fatal(&mut self, err: &PlatformError) {
        self.on_join_failed(&JoinFailure::from(err.clone()));
    }

    pub async fn handle(&mut self, event: Event) {
        debug!(%event, "event");
        match event {
            Event::Status { id, status } => self.on_status(id, status).await,
            Event::JoinTimedOut { id } => {
                let joining = self
                    .session
                    .link(id)
                    .is_some_and(|link| link.phase() == LinkPhase::Joining);
                if joining {
                    self.finish_join(id, Err(JoinFailure::Timeout));
                }
            }
            Event::GraceElapsed { id, window } => {
                let pending = self.session.link(id).is_some_and(|link| {
                    link.phase() == LinkPhase::PendingCheck && link.grace_window() == Some(window)
                });
                if pending {
                    self.resolve_disconnect(id).await;
                } else {
                    debug!(connection = %id, window, "stale grace window ignored");
                }
            }
            Event::RejoinDue { generation } => {
                let due = self
                    .rejoin
                    .as_ref()
                    .is_some_and(|(scheduled, _)| *scheduled == generation);
                if due {
                    self.rejoin = None;
                    self.attempt_join().await;
                }
            }
            Event::RetryTick { generation } => {
                if self.session.retrying() && self.retry.is_current(generation) {
                    self.attempt_join().await;
                }
            }
        }
    }

    async fn on_status(&mut self, id: ConnectionId, status: ConnectionStatus) {
        let Some(link) = self.session.link_mut(id) else {
            debug!(connection = %id, %status, "status from superseded connection ignored");
            return;
        };

        match link.phase().on_status(status) {
            Transition::Stay => {}
            Transition::JoinSucceeded => self.finish_join(id, Ok(())),
            Transition::JoinFailed(_) => self.finish_join(id, Err(JoinFailure::Disconnected)),
            Transition::BeginGrace => {
                info!(
                    connection = %id,
                    grace_ms = self.timings.grace_window.as_millis() as u64,
                    "disconnected, waiting for recovery"
                );
                self.grace_windows += 1;
                let window = self.grace_windows;
                let grace = Timer::after(
                    self.timings.grace_window,
                    self.tx.clone(),
                    Event::GraceElapsed { id, window },
                );
                link.begin_grace(window, grace);
            }
            Transition::ResolveGrace => {
                link.end_grace();
                self.resolve_disconnect(id).await;
            }
            Transition::Released => {
                if let Some(link) = self.session.take_if_current(id) {
                    info!(connection = %id, "connection destroyed");
                    self.release(link);
                }
            }
        }
    }

    /// Decide between platform recovery, squeeze, and network drop
    async fn resolve_disconnect(&mut self, id: ConnectionId) {
        let status = match self.session.link_mut(id) {
            Some(link) => {
                link.end_grace();
                link.status()
            }
            None => return,
        };

        if status != ConnectionStatus::Disconnected {
            if let Some(link) = self.session.link_mut(id) {
                info!(connection = %id, %status, "platform is recovering the connection");
                link.mark_ready();
            }
            return;
        }

        let membership = self.fetch_membership().await;

        // the fetch yielded; make sure nothing replaced this connection meanwhile
        if self.session.current_id() != Some(id) {
            debug!(connection = %id, "connection superseded during squeeze check");
            return;
        }

        match membership {
            Some(channel) if channel.has_member(self.self_id) => {
                self.retry.exit(&mut self.session, false);
                self.rejoin = None;
                self.session.pause();
                if let Some(link) = self.session.take_if_current(id) {
                    self.release(link);
                }
                info!(connection = %id, "owner took the channel back, pausing");
            }
            _ => {
                if let Some(link) = self.session.take_if_current(id) {
                    self.release(link);
                }
                if self.session.paused() {
                    return;
                }
                warn!(
                    connection = %id,
                    delay_ms = self.timings.rejoin_delay.as_millis() as u64,
                    "connection lost, rejoining"
                );
                self.schedule_rejoin();
            }
        }
    }

    async fn fetch_membership(&self) -> Option<ChannelSnapshot> {
        let attempts = self.timings.membership_fetch_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_target().await {
                Ok(channel) => return Some(channel),
                Err(e) => warn!(attempt, attempts, error = %e, "membership fetch failed"),
            }
        }
        None
    }

    fn schedule_rejoin(&mut self) {
        self.rejoin_generation += 1;
        let generation = self.rejoin_generation;
        let timer = Timer::after(
            self.timings.rejoin_delay,
            self.tx.clone(),
            Event::RejoinDue { generation },
        );
        self.rejoin = Some((generation, timer));
    }

    fn release(&mut self, link: ActiveLink) {
        if link.phase() == LinkPhase::Joining {
            self.session.end_join();
        }
        link.release();
    }

    /// Cancel everything and leave; used on process shutdown
    pub fn shutdown(&mut self) {
        self.leave();
        info!("connection manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{self, Instant};

    use super::*;
    use crate::notify::{NotificationSink, RecordingSink};
    use crate::platform::fake::{FakeGateway, OWNER, TARGET};
    use crate::platform::Snowflake;

    struct Harness {
        manager: ConnectionManager,
        rx: mpsc::Receiver<Event>,
        gateway: FakeGateway,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let gateway = FakeGateway::new();
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(
            Some(sink.clone() as Arc<dyn NotificationSink>),
            None,
            Duration::from_secs(30),
        );
        let (tx, rx) = mpsc::channel(64);
        let manager = ConnectionManager::new(
            TARGET,
            Timings::default(),
            Arc::new(gateway.clone()),
            notifier,
            tx,
        );
        Harness {
            manager,
            rx,
            gateway,
            sink,
        }
    }

    impl Harness {
        /// Handle the next internal event, letting virtual time run
        async fn step(&mut self) -> Event {
            let event = self.rx.recv().await.expect("event channel closed");
            self.manager.handle(event).await;
            event
        }

        /// Handle events until `done` holds for one of them
        async fn step_until(&mut self, done: impl Fn(&Event) -> bool) -> Event {
            loop {
                let event = self.step().await;
                if done(&event) {
                    return event;
                }
            }
        }

        /// Handle whatever is already queued without advancing time
        async fn drain(&mut self) {
            loop {
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
                match self.rx.try_recv() {
                    Ok(event) => self.manager.handle(event).await,
                    Err(_) => break,
                }
            }
        }

        async fn connect(&mut self) -> ConnectionId {
            let JoinAttempt::Started(id) = self.manager.attempt_join().await else {
                panic!("join did not start");
            };
            self.gateway.last_link().set_status(ConnectionStatus::Ready);
            self.step_until(|e| matches!(e, Event::Status { status: ConnectionStatus::Ready, .. }))
                .await;
            assert_eq!(self.manager.session().link_state(), LinkState::Ready);
            id
        }

        /// Assert nothing arrives within `window`
        async fn quiet_for(&mut self, window: Duration) {
            let next = time::timeout(window, self.rx.recv()).await;
            assert!(next.is_err(), "unexpected event: {next:?}");
        }
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_reaches_ready() {
        let mut h = harness();
        let id = h.connect().await;

        assert_eq!(h.manager.session().current_id(), Some(id));
        assert!(!h.manager.session().joining());
        assert_eq!(h.gateway.joins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_full_enters_retry_and_throttles() {
        let mut h = harness();
        h.gateway.set_limit(Some(5));
        h.gateway.set_members((10..15).map(Snowflake).collect());

        let attempt = h.manager.attempt_join().await;
        assert_eq!(
            attempt,
            JoinAttempt::Failed(JoinFailure::ChannelFull { members: 5, limit: 5 })
        );
        assert_eq!(h.gateway.joins(), 0);
        assert!(h.manager.session().retrying());

        // next tick fails the same way, no second capacity alert
        let start = Instant::now();
        h.step_until(|e| matches!(e, Event::RetryTick { .. })).await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(h.manager.session().retrying());
        settle().await;
        assert_eq!(h.sink.count(NotificationKind::Capacity), 1);
        assert_eq!(h.gateway.joins(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_alert_throttled_across_retry_sessions() {
        let mut h = harness();
        h.gateway.set_limit(Some(1));
        h.gateway.set_members(vec![Snowflake(10)]);
        h.manager.attempt_join().await;
        h.manager.resume();
        assert!(!h.manager.session().retrying());

        // a fresh retry session 10s later hits the cooldown
        time::advance(Duration::from_secs(10)).await;
        h.manager.attempt_join().await;
        assert!(h.manager.session().retrying());
        settle().await;
        assert_eq!(h.sink.count(NotificationKind::Capacity), 1);

        h.manager.resume();
        time::advance(Duration::from_secs(25)).await;
        h.manager.attempt_join().await;
        settle().await;
        assert_eq!(h.sink.count(NotificationKind::Capacity), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_when_room_frees_up() {
        let mut h = harness();
        h.gateway.set_limit(Some(1));
        h.gateway.set_members(vec![Snowflake(10)]);
        h.manager.attempt_join().await;
        assert!(h.manager.session().retrying());

        h.gateway.set_members(vec![]);
        h.step_until(|e| matches!(e, Event::RetryTick { .. })).await;
        assert_eq!(h.gateway.joins(), 1);
        h.gateway.last_link().set_status(ConnectionStatus::Ready);
        h.drain().await;

        assert!(!h.manager.session().retrying());
        assert_eq!(h.manager.session().link_state(), LinkState::Ready);
        settle().await;
        assert_eq!(h.sink.count(NotificationKind::Recovered), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_join_dropped_while_in_flight() {
        let mut h = harness();
        assert!(matches!(h.manager.attempt_join().await, JoinAttempt::Started(_)));
        assert_eq!(
            h.manager.attempt_join().await,
            JoinAttempt::Refused(Refusal::InFlight)
        );
        assert_eq!(h.gateway.joins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_refused_while_paused() {
        let mut h = harness();
        h.manager.pause("test");
        assert_eq!(
            h.manager.attempt_join().await,
            JoinAttempt::Refused(Refusal::Paused)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_schedules_rejoin() {
        let mut h = harness();
        let start = Instant::now();
        h.manager.attempt_join().await;

        let event = h.step().await;
        assert!(matches!(event, Event::JoinTimedOut { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(!h.manager.session().joining());
        assert!(!h.manager.session().has_connection());
        assert_eq!(h.gateway.link(0).destroy_calls(), 1);

        h.step_until(|e| matches!(e, Event::RejoinDue { .. })).await;
        assert_eq!(start.elapsed(), Duration::from_millis(10_500));
        assert_eq!(h.gateway.joins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_squeeze_pauses_without_reconnect() {
        let mut h = harness();
        h.connect().await;
        let link = h.gateway.last_link();

        // owner joins from another device and displaces the agent
        h.gateway.set_members(vec![OWNER]);
        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        assert_eq!(h.manager.session().link_state(), LinkState::PendingCheck);

        let start = Instant::now();
        h.step_until(|e| matches!(e, Event::GraceElapsed { .. })).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1200));

        assert!(h.manager.session().paused());
        assert!(!h.manager.session().has_connection());
        assert_eq!(link.destroy_calls(), 1);

        h.drain().await;
        h.quiet_for(Duration::from_secs(30)).await;
        assert_eq!(h.gateway.joins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_drop_rejoins_after_delay() {
        let mut h = harness();
        h.connect().await;
        let link = h.gateway.last_link();

        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        let start = Instant::now();
        h.step_until(|e| matches!(e, Event::GraceElapsed { .. })).await;

        assert!(!h.manager.session().paused());
        assert!(!h.manager.session().has_connection());
        assert_eq!(link.destroy_calls(), 1);

        h.step_until(|e| matches!(e, Event::RejoinDue { .. })).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1200 + 500));
        assert_eq!(h.gateway.joins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_recovery_ends_grace_early() {
        let mut h = harness();
        let id = h.connect().await;
        let link = h.gateway.last_link();

        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        link.set_status(ConnectionStatus::Connecting);
        h.drain().await;

        // still the same handle, watched again, no membership fetch needed
        let fetches = h.gateway.fetches();
        assert_eq!(h.manager.session().current_id(), Some(id));
        assert_eq!(h.manager.session().link_state(), LinkState::Ready);
        assert_eq!(link.destroy_calls(), 0);

        link.set_status(ConnectionStatus::Ready);
        h.drain().await;
        h.quiet_for(Duration::from_secs(5)).await;
        assert_eq!(h.gateway.fetches(), fetches);
        assert_eq!(h.gateway.joins(), 1);

        // a later drop is still detected
        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        assert_eq!(h.manager.session().link_state(), LinkState::PendingCheck);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_membership_fetch_counts_as_drop() {
        let mut h = harness();
        h.connect().await;
        h.gateway.set_members(vec![OWNER]);
        h.gateway.fail_fetches(1);

        h.gateway.last_link().set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        h.step_until(|e| matches!(e, Event::GraceElapsed { .. })).await;

        assert!(!h.manager.session().paused());
        h.step_until(|e| matches!(e, Event::RejoinDue { .. })).await;
        assert_eq!(h.gateway.joins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_event_from_earlier_window_ignored() {
        let mut h = harness();
        let id = h.connect().await;
        let link = h.gateway.last_link();

        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;

        // grace runs out in the same tick the handle starts reconnecting
        time::advance(Duration::from_millis(1200)).await;
        link.set_status(ConnectionStatus::Connecting);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let mut stale = None;
        while let Ok(event) = h.rx.try_recv() {
            match event {
                Event::GraceElapsed { .. } => stale = Some(event),
                other => h.manager.handle(other).await,
            }
        }
        let stale = stale.expect("first grace window did not run out");
        assert_eq!(h.manager.session().link_state(), LinkState::Ready);

        // the owner shows up and the handle drops again
        h.gateway.set_members(vec![OWNER]);
        link.set_status(ConnectionStatus::Ready);
        h.drain().await;
        link.set_status(ConnectionStatus::Disconnected);
        h.drain().await;
        assert_eq!(h.manager.session().link_state(), LinkState::PendingCheck);

        h.manager.handle(stale).await;
        assert_eq!(h.manager.session().link_state(), LinkState::PendingCheck);
        assert_eq!(h.manager.session().current_id(), Some(id));
        assert!(!h.manager.session().paused());
        assert_eq!(link.destroy_calls(), 0);

        // the second window still runs its full length
        let start = Instant::now();
        h.step_until(|e| matches!(e, Event::GraceElapsed { .. })).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1200));
        assert!(h.manager.session().paused());
        assert_eq!(link.destroy_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_from_other_generation_ignored() {
        let mut h = harness();
        h.manager.attempt_join().await;
        let event = h.step().await;
        assert!(matches!(event, Event::JoinTimedOut { .. }));

        h.manager.handle(Event::RejoinDue { generation: 999 }).await;
        assert_eq!(h.gateway.joins(), 1);

        h.step_until(|e| matches!(e, Event::RejoinDue { .. })).await;
        assert_eq!(h.gateway.joins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_status_ignored() {
        let mut h = harness();
        let first = h.connect().await;
        let old = h.gateway.last_link();

        // force a fresh join that supersedes the first connection
        h.manager.resume();
        let JoinAttempt::Started(second) = h.manager.attempt_join().await else {
            panic!("second join did not start");
        };
        assert_ne!(first, second);
        assert_eq!(old.destroy_calls(), 1);

        h.manager
            .handle(Event::Status {
                id: first,
                status: ConnectionStatus::Disconnected,
            })
            .await;
        h.manager
            .handle(Event::GraceElapsed {
                id: first,
                window: 1,
            })
            .await;

        assert_eq!(h.manager.session().current_id(), Some(second));
        assert_eq!(h.manager.session().link_state(), LinkState::Joining);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_twice_is_noop() {
        let mut h = harness();
        h.connect().await;
        let link = h.gateway.last_link();

        assert!(h.manager.leave());
        assert!(!h.manager.leave());

        assert_eq!(link.destroy_calls(), 1);
        assert!(!h.manager.session().has_connection());
        assert_eq!(h.manager.session().link_state(), LinkState::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_detaches_listener() {
        let mut h = harness();
        h.connect().await;
        let link = h.gateway.last_link();
        assert_eq!(link.subscribers(), 1);

        h.manager.leave();
        settle().await;
        assert_eq!(link.subscribers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_destroys_orphan() {
        let mut h = harness();
        let orphan = h.gateway.plant_orphan();

        assert!(h.manager.leave());
        assert_eq!(orphan.destroy_calls(), 1);
        assert!(!h.manager.leave());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_cancels_retry() {
        let mut h = harness();
        h.gateway.set_limit(Some(1));
        h.gateway.set_members(vec![Snowflake(10)]);
        h.manager.attempt_join().await;
        assert!(h.manager.session().retrying());

        h.manager.pause("command");

        let report = h.manager.status_report();
        assert!(report.paused);
        assert!(!report.retrying);
        assert_eq!(report.to_string(), "PAUSED, link Idle");
        h.quiet_for(Duration::from_secs(20)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_status_clears_connection() {
        let mut h = harness();
        h.connect().await;

        h.gateway.last_link().set_status(ConnectionStatus::Destroyed);
        h.drain().await;

        assert!(!h.manager.session().has_connection());
        assert!(!h.manager.session().paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_channel_is_fatal() {
        let mut h = harness();
        h.gateway.remove_channel();

        let attempt = h.manager.attempt_join().await;
        assert_eq!(
            attempt,
            JoinAttempt::Failed(JoinFailure::ChannelNotFound(TARGET.channel))
        );
        settle().await;
        assert_eq!(h.sink.count(NotificationKind::Error), 1);
        h.quiet_for(Duration::from_secs(30)).await;
    }

    #[test]
    fn test_status_report_display() {
        let report = StatusReport {
            paused: false,
            retrying: true,
            link: LinkState::Idle,
        };
        assert_eq!(report.to_string(), "RUNNING (retry mode), link Idle");
    }
}
