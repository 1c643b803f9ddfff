//! Daemon entry point
//!
//! Wires the connection manager, presence arbiter and command dispatcher
//! onto one event loop. The embedding binary supplies the platform gateway
//! and the stream of platform events.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::arbiter::PresenceArbiter;
use crate::command::CommandDispatcher;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::events::{Event, PlatformEvent};
use crate::lifecycle::ShutdownSignal;
use crate::notify::Notifier;
use crate::platform::VoiceGateway;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Run until SIGINT or SIGTERM
pub async fn run(
    config: Config,
    gateway: Arc<dyn VoiceGateway>,
    platform_rx: mpsc::Receiver<PlatformEvent>,
) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    run_until(config, gateway, platform_rx, async move {
        match shutdown.wait().await {
            Ok(signal) => info!(%signal, "stop requested"),
            Err(e) => {
                error!(?e, "failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    })
    .await
}

/// Run until `shutdown` resolves or the platform event stream ends
pub async fn run_until<F>(
    config: Config,
    gateway: Arc<dyn VoiceGateway>,
    mut platform_rx: mpsc::Receiver<PlatformEvent>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    info!(
        version = env!("CARGO_PKG_VERSION"),
        guild = %config.target.guild,
        channel = %config.target.channel,
        "voice-warden starting"
    );

    let notifier = Notifier::from_config(&config)?;
    if !notifier.is_enabled() {
        info!("no webhook configured, notifications disabled");
    }

    // Timers and connection listeners -> daemon loop
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);

    let mut manager = ConnectionManager::new(
        config.target,
        config.timings,
        Arc::clone(&gateway),
        notifier,
        event_tx,
    );
    let owner = gateway.self_id();
    let arbiter = PresenceArbiter::new(config.target, owner);
    let dispatcher = CommandDispatcher::new(owner);

    arbiter.initialize(&mut manager).await;
    info!(owner = %owner, "initialized, entering main loop");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                manager.handle(event).await;
            }

            event = platform_rx.recv() => match event {
                Some(PlatformEvent::VoiceStateUpdate(update)) => {
                    arbiter.on_voice_state(&update, &mut manager).await;
                }
                Some(PlatformEvent::MessageCreate(message)) => {
                    dispatcher.dispatch(&message, &mut manager, gateway.as_ref()).await;
                }
                None => {
                    info!("platform event stream closed");
                    break;
                }
            },

            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("shutting down...");
    manager.shutdown();
    gateway.close().await;
    info!("voice-warden stopped");

    Ok(())
}
