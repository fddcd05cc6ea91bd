//! Comms subsystem — manages all external I/O channels.
//!
//! # Architecture
//!
//! Each channel (PTY, axum HTTP) implements [`runtime::Component`] and is
//! spawned as an independent concurrent task by [`start`] via
//! [`runtime::spawn_components`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time — no state is passed through
//! the generic `Component::run` signature.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, session tracking). It is drained in a
//! short-lived background task that dies naturally when all channel
//! senders are dropped.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

pub mod axum_channel;
pub mod pty;
mod state;

pub use state::{CommsEvent, CommsReply, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};
use crate::supervisor::bus::BusHandle;

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Channels start immediately. If any channel exits with an error the
/// shared `shutdown` token is cancelled so siblings stop cooperatively.
/// The handle resolves when all channels have exited.
///
/// # Non-blocking
///
/// This function is synchronous — it returns as soon as the tasks are
/// spawned. The caller decides when (or whether) to await the handle.
pub fn start(config: &Config, bus: BusHandle, shutdown: CancellationToken) -> SubsystemHandle {
    // Intra-subsystem event channel: channels → manager.
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(bus, event_tx));

    // Each channel captures Arc<CommsState> at construction; the generic
    // Component::run signature only needs the shutdown token.
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    if config.comms_pty_should_load() {
        info!("loading pty channel");
        components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
    }

    if config.comms_axum_should_load() {
        info!(bind = %config.comms.axum_channel.bind, "loading axum channel");
        components.push(Box::new(axum_channel::AxumChannel::new(
            "axum0",
            config.comms.axum_channel.bind.clone(),
            state.clone(),
        )));
    }

    if components.is_empty() {
        info!("no comms channels configured — waiting for shutdown");
    }

    // Event drain: consumes CommsEvent until all channel senders are
    // dropped (i.e. all channels have exited). Monitoring-only — it does
    // not affect lifecycle.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::SessionStarted { ref channel_id, ref session_id } => {
                    debug!(channel_id, session_id, "channel session started");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}
