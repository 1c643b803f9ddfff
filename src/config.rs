//! Configuration loading and management

use std::time::Duration;

use anyhow::{Context, Result};

use crate::platform::{Snowflake, TargetLocation};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Guild and voice channel to hold
    pub target: TargetLocation,

    /// Webhook for outbound alerts; notifications are off without it
    pub webhook_url: Option<String>,

    /// Prepended to the webhook message content, e.g. `<@1234>`
    pub webhook_mention: Option<String>,

    pub timings: Timings,
}

/// Every wait the connection lifecycle uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Upper bound on waiting for a fresh connection to settle
    pub join_timeout: Duration,
    /// How long a disconnected connection gets to recover on its own
    pub grace_window: Duration,
    /// Fresh membership fetches attempted before giving up on the squeeze check
    pub membership_fetch_attempts: u32,
    /// Pause before rejoining after a network-level drop
    pub rejoin_delay: Duration,
    /// Period of the retry timer while the channel is full
    pub retry_interval: Duration,
    /// Minimum gap between two "channel full" notifications
    pub capacity_cooldown: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            grace_window: Duration::from_millis(1200),
            membership_fetch_attempts: 1,
            rejoin_delay: Duration::from_millis(500),
            retry_interval: Duration::from_secs(5),
            capacity_cooldown: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(?path, "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let guild = required_id(&get, "GUILD_ID")?;
        let channel = required_id(&get, "CHANNEL_ID")?;

        let defaults = Timings::default();
        let timings = Timings {
            join_timeout: millis(&get, "JOIN_TIMEOUT_MS", defaults.join_timeout)?,
            grace_window: millis(&get, "GRACE_WINDOW_MS", defaults.grace_window)?,
            membership_fetch_attempts: match get("MEMBERSHIP_FETCH_ATTEMPTS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .with_context(|| format!("MEMBERSHIP_FETCH_ATTEMPTS is not a number: {raw}"))?
                    .max(1),
                None => defaults.membership_fetch_attempts,
            },
            rejoin_delay: millis(&get, "REJOIN_DELAY_MS", defaults.rejoin_delay)?,
            retry_interval: millis(&get, "RETRY_INTERVAL_MS", defaults.retry_interval)?,
            capacity_cooldown: millis(&get, "CAPACITY_COOLDOWN_MS", defaults.capacity_cooldown)?,
        };

        Ok(Self {
            target: TargetLocation { guild, channel },
            webhook_url: get("WEBHOOK_URL"),
            webhook_mention: get("WEBHOOK_MENTION"),
            timings,
        })
    }
}

fn required_id(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Snowflake> {
    let raw = get(key).with_context(|| format!("{key} is not set"))?;
    let id = raw
        .parse::<u64>()
        .with_context(|| format!("{key} is not a valid id: {raw}"))?;
    Ok(Snowflake(id))
}

fn millis(get: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match get(key) {
        Some(raw) => {
            let ms = raw
                .parse::<u64>()
                .with_context(|| format!("{key} is not a number of milliseconds: {raw}"))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}
