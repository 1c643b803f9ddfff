//! Webhook message body
//!
//! `{content, embeds: [{title, description, color, timestamp, footer}]}`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::NotificationKind;

const FOOTER: &str = "voice-warden";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    /// Mention string, or empty
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    /// RFC 3339
    pub timestamp: String,
    pub footer: Footer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footer {
    pub text: String,
}

impl WebhookPayload {
    pub fn new(
        kind: NotificationKind,
        description: impl Into<String>,
        mention: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: mention.unwrap_or_default().to_string(),
            embeds: vec![Embed {
                title: kind.title().to_string(),
                description: description.into(),
                color: kind.color(),
                timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
                footer: Footer {
                    text: FOOTER.to_string(),
                },
            }],
        }
    }

    pub fn kind_title(&self) -> Option<&str> {
        self.embeds.first().map(|embed| embed.title.as_str())
    }
}
