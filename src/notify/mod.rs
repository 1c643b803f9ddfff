//! Fire-and-forget outbound alerts
//!
//! Capacity alerts are throttled to one per cooldown window, measured from
//! the last send that went through. Everything else goes out unthrottled.
//! Delivery failures are logged and dropped.

mod payload;
mod webhook;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;

pub use payload::{Embed, Footer, WebhookPayload};
pub use webhook::WebhookSink;

/// Category of an alert; picks the embed title and color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Capacity,
    Recovered,
    Error,
    Info,
}

impl NotificationKind {
    pub fn title(self) -> &'static str {
        match self {
            NotificationKind::Capacity => "Channel full",
            NotificationKind::Recovered => "Recovered",
            NotificationKind::Error => "Error",
            NotificationKind::Info => "Notice",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            NotificationKind::Capacity => 0xF1C40F,
            NotificationKind::Recovered => 0x2ECC71,
            NotificationKind::Error => 0xE74C3C,
            NotificationKind::Info => 0x3498DB,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Where notifications are delivered
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), NotifyError>;
}

/// Cheap to clone; clones share the cooldown
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Option<Arc<dyn NotificationSink>>,
    mention: Option<String>,
    capacity_cooldown: Duration,
    /// Instant of the last capacity send that is in flight or went through
    last_capacity: Mutex<Option<Instant>>,
}

impl Notifier {
    pub fn new(
        sink: Option<Arc<dyn NotificationSink>>,
        mention: Option<String>,
        capacity_cooldown: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                mention,
                capacity_cooldown,
                last_capacity: Mutex::new(None),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None, Duration::ZERO)
    }

    /// Build from configuration; a missing webhook URL disables notifications
    pub fn from_config(config: &Config) -> Result<Self> {
        let sink = match &config.webhook_url {
            Some(url) => {
                Some(Arc::new(WebhookSink::new(url.clone())?) as Arc<dyn NotificationSink>)
            }
            None => None,
        };
        Ok(Self::new(
            sink,
            config.webhook_mention.clone(),
            config.timings.capacity_cooldown,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.sink.is_some()
    }

    /// Queue a notification. Returns whether it was dispatched.
    pub fn notify(&self, kind: NotificationKind, text: impl Into<String>) -> bool {
        let Some(sink) = self.inner.sink.clone() else {
            return false;
        };

        let reserved = if kind == NotificationKind::Capacity {
            match self.reserve_capacity_slot() {
                Some(at) => Some(at),
                None => {
                    debug!("capacity notification suppressed by cooldown");
                    return false;
                }
            }
        } else {
            None
        };

        let payload = WebhookPayload::new(
            kind,
            text,
            self.inner.mention.as_deref(),
            chrono::Utc::now(),
        );
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            match sink.send(&payload).await {
                Ok(()) => debug!(?kind, "notification sent"),
                Err(e) => {
                    warn!(?kind, error = %e, "notification delivery failed");
                    if let Some(at) = reserved {
                        inner.release_capacity_slot(at);
                    }
                }
            }
        });
        true
    }

    fn reserve_capacity_slot(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut last = self
            .inner
            .last_capacity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.inner.capacity_cooldown {
                return None;
            }
        }
        *last = Some(now);
        Some(now)
    }
}

impl Inner {
    /// Undo a reservation whose send failed, unless a newer one replaced it
    fn release_capacity_slot(&self, at: Instant) {
        let mut last = self
            .last_capacity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last == Some(at) {
            *last = None;
        }
    }
}

/// Sink that records payloads instead of sending them
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<WebhookPayload>>,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingSink {
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| p.kind_title().map(str::to_string))
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.titles().iter().filter(|t| *t == kind.title()).count()
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Status {
                status: 500,
                body: "unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
