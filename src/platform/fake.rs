//! Scripted in-memory gateway for tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    ChannelId, ChannelSnapshot, ConnectionStatus, GuildId, JoinOptions, MessageId,
    PlatformError, Snowflake, TargetLocation, UserId, VoiceConnection, VoiceGateway,
};

pub const OWNER: UserId = Snowflake(100);
pub const TARGET: TargetLocation = TargetLocation {
    guild: Snowflake(1),
    channel: Snowflake(2),
};
pub const OTHER_CHANNEL: ChannelId = Snowflake(3);

/// Shared state behind one fake connection
pub struct FakeLink {
    status: Mutex<ConnectionStatus>,
    tx: broadcast::Sender<ConnectionStatus>,
    destroy_calls: Mutex<usize>,
}

impl FakeLink {
    fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Self {
            status: Mutex::new(ConnectionStatus::Signalling),
            tx,
            destroy_calls: Mutex::new(0),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    /// Drive a status transition as the voice subsystem would
    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
        let _ = self.tx.send(status);
    }

    pub fn destroy_calls(&self) -> usize {
        *self.destroy_calls.lock().unwrap()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

struct FakeConnection(Arc<FakeLink>);

impl VoiceConnection for FakeConnection {
    fn status(&self) -> ConnectionStatus {
        self.0.status()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.0.tx.subscribe()
    }

    fn destroy(&self) {
        *self.0.destroy_calls.lock().unwrap() += 1;
        let mut status = self.0.status.lock().unwrap();
        if *status != ConnectionStatus::Destroyed {
            *status = ConnectionStatus::Destroyed;
            let _ = self.0.tx.send(ConnectionStatus::Destroyed);
        }
    }
}

struct Inner {
    channel: Option<ChannelSnapshot>,
    fetch_failures: usize,
    fetches: usize,
    links: Vec<Arc<FakeLink>>,
    orphan: Option<Arc<FakeLink>>,
    deleted: Vec<MessageId>,
    closed: bool,
}

/// Gateway double. Connections it opens stay in `Signalling` until a test
/// moves them along with [`FakeLink::set_status`].
#[derive(Clone)]
pub struct FakeGateway {
    inner: Arc<Mutex<Inner>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                channel: Some(ChannelSnapshot {
                    id: TARGET.channel,
                    name: "lounge".into(),
                    user_limit: None,
                    members: vec![Snowflake(7)],
                }),
                fetch_failures: 0,
                fetches: 0,
                links: Vec::new(),
                orphan: None,
                deleted: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn set_limit(&self, limit: Option<u32>) {
        if let Some(channel) = self.inner.lock().unwrap().channel.as_mut() {
            channel.user_limit = limit;
        }
    }

    pub fn set_members(&self, members: Vec<UserId>) {
        if let Some(channel) = self.inner.lock().unwrap().channel.as_mut() {
            channel.members = members;
        }
    }

    pub fn remove_channel(&self) {
        self.inner.lock().unwrap().channel = None;
    }

    /// Make the next `n` channel fetches fail
    pub fn fail_fetches(&self, n: usize) {
        self.inner.lock().unwrap().fetch_failures = n;
    }

    pub fn fetches(&self) -> usize {
        self.inner.lock().unwrap().fetches
    }

    pub fn joins(&self) -> usize {
        self.inner.lock().unwrap().links.len()
    }

    pub fn link(&self, index: usize) -> Arc<FakeLink> {
        Arc::clone(&self.inner.lock().unwrap().links[index])
    }

    pub fn last_link(&self) -> Arc<FakeLink> {
        let inner = self.inner.lock().unwrap();
        Arc::clone(inner.links.last().expect("no connection opened"))
    }

    /// Register a connection the voice subsystem knows about but the daemon
    /// does not
    pub fn plant_orphan(&self) -> Arc<FakeLink> {
        let link = FakeLink::new();
        link.set_status(ConnectionStatus::Ready);
        self.inner.lock().unwrap().orphan = Some(Arc::clone(&link));
        link
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.inner.lock().unwrap().deleted.clone()
    }

    pub fn closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    fn self_id(&self) -> UserId {
        OWNER
    }

    async fn fetch_channel(
        &self,
        target: TargetLocation,
    ) -> Result<ChannelSnapshot, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetches += 1;
        if inner.fetch_failures > 0 {
            inner.fetch_failures -= 1;
            return Err(PlatformError::Request("gateway unavailable".into()));
        }
        if target.guild != TARGET.guild {
            return Err(PlatformError::GuildNotFound(target.guild));
        }
        inner
            .channel
            .clone()
            .ok_or(PlatformError::ChannelNotFound(target.channel))
    }

    async fn connect(
        &self,
        _target: TargetLocation,
        _options: JoinOptions,
    ) -> Result<Box<dyn VoiceConnection>, PlatformError> {
        let link = FakeLink::new();
        self.inner.lock().unwrap().links.push(Arc::clone(&link));
        Ok(Box::new(FakeConnection(link)))
    }

    fn existing_connection(&self, guild: GuildId) -> Option<Box<dyn VoiceConnection>> {
        if guild != TARGET.guild {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let link = inner
            .orphan
            .iter()
            .chain(inner.links.last())
            .find(|link| link.status() != ConnectionStatus::Destroyed)
            .cloned()?;
        Some(Box::new(FakeConnection(link)))
    }

    async fn delete_message(
        &self,
        _channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted.push(message);
        // odd ids simulate a message that can no longer be deleted
        if message.0 % 2 == 1 {
            return Err(PlatformError::Request("missing permissions".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }
}
