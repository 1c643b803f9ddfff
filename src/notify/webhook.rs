//! HTTP webhook sink

use async_trait::async_trait;
use tracing::debug;

use super::payload::WebhookPayload;
use super::{NotificationSink, NotifyError};

pub struct WebhookSink {
    url: String,
    http: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let resp = self.http.post(&self.url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(status = status.as_u16(), "webhook delivered");
        Ok(())
    }
}
