//! Axum-based HTTP channel — serves the intake API under `/api/`.
//!
//! Implements [`Component`] so it slots into the comms subsystem
//! lifecycle: `run()` drives the axum event loop; the shared
//! [`CancellationToken`] is wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/health
//! POST /api/intake/start
//! POST /api/intake/message
//! POST /api/program
//! POST /api/users/sync
//! GET  /api/session/{session_id}
//! ```

mod api;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::CommsState;

// ── Shared request state ─────────────────────────────────────────────────────

/// Axum router state injected into every handler via
/// [`axum::extract::State`]. Cheap to clone — all fields are
/// reference-counted.
#[derive(Clone)]
pub struct AxumState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    /// Comms subsystem capabilities (message routing, session queries).
    pub comms: Arc<CommsState>,
}

impl AxumState {
    pub fn new(channel_id: impl AsRef<str>, comms: Arc<CommsState>) -> Self {
        Self { channel_id: Arc::from(channel_id.as_ref()), comms }
    }
}

// ── AxumChannel ──────────────────────────────────────────────────────────────

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
        }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

// ── Server loop ──────────────────────────────────────────────────────────────

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(AxumState::new(&channel_id, comms));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "axum channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    Ok(())
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the API router. Public so integration tests can drive it with
/// `tower::ServiceExt::oneshot` without binding a socket.
pub fn build_router(state: AxumState) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/intake/start", post(api::intake_start))
        .route("/api/intake/message", post(api::intake_message))
        .route("/api/program", post(api::program))
        .route("/api/users/sync", post(api::users_sync))
        .route("/api/session/{session_id}", get(api::session_detail))
        .with_state(state)
}
