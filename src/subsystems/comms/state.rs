//! Shared state for the comms subsystem — capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The raw [`BusHandle`] is private; channels cannot call
//! arbitrary bus methods or supervisor internals.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager (e.g. "I shut down") without going through the
//! supervisor bus. The manager owns the receiver end.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AppError;
use crate::supervisor::bus::{
    BusError, BusHandle, BusPayload, ERR_BUSY, ERR_NOT_READY, ERR_SESSION_NOT_FOUND,
};

/// An agent's reply to a channel message.
#[derive(Debug, Clone)]
pub struct CommsReply {
    pub reply: String,
    pub session_id: Option<String>,
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A new intake session was started on the channel.
    SessionStarted { channel_id: String, session_id: String },
}

// ── State ────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    /// Supervisor bus — private so channels can't call arbitrary methods.
    bus: BusHandle,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(bus: BusHandle, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { bus, event_tx }
    }

    /// Start an intake session; returns the greeting and the new session id.
    pub async fn start_intake(
        &self,
        channel_id: &str,
        user_name: Option<String>,
    ) -> Result<CommsReply, AppError> {
        let payload = BusPayload::CommsMessage {
            channel_id: channel_id.to_string(),
            content: user_name.unwrap_or_default(),
            session_id: None,
            usage: None,
        };
        self.comms_request("agents/intake/start", payload).await
    }

    /// Send a chat turn from `channel_id` to the routed agent and await the
    /// reply. This is the primary outbound path for all comms channels.
    pub async fn send_message(
        &self,
        channel_id: &str,
        content: String,
        session_id: Option<String>,
    ) -> Result<CommsReply, AppError> {
        let payload = BusPayload::CommsMessage {
            channel_id: channel_id.to_string(),
            content,
            session_id,
            usage: None,
        };
        self.comms_request("agents", payload).await
    }

    /// Hand a completed session to the program-generation agent.
    pub async fn generate_program(
        &self,
        channel_id: &str,
        session_id: &str,
    ) -> Result<CommsReply, AppError> {
        let payload = BusPayload::CommsMessage {
            channel_id: channel_id.to_string(),
            content: String::new(),
            session_id: Some(session_id.to_string()),
            usage: None,
        };
        self.comms_request("agents/program", payload).await
    }

    /// Sync a user record; returns the `{id, created}` JSON body.
    pub async fn sync_user(
        &self,
        name: String,
        email: String,
        identity_id: String,
        image: Option<String>,
    ) -> Result<String, AppError> {
        let payload = BusPayload::UserSync { name, email, identity_id, image };
        match self.bus.request("users/sync", payload).await {
            Err(e) => Err(e),
            Ok(Err(e)) => Err(agent_error(e)),
            Ok(Ok(BusPayload::JsonResponse { data })) => Ok(data),
            Ok(Ok(_)) => Err(AppError::Comms("unexpected users reply payload".to_string())),
        }
    }

    /// Fetch the transcript + metadata JSON for a session.
    pub async fn session_detail(&self, session_id: &str) -> Result<String, AppError> {
        let payload = BusPayload::SessionQuery { session_id: session_id.to_string() };
        match self.bus.request("agents/sessions/detail", payload).await {
            Err(e) => Err(e),
            Ok(Err(e)) => Err(agent_error(e)),
            Ok(Ok(BusPayload::JsonResponse { data })) => Ok(data),
            Ok(Ok(_)) => Err(AppError::Comms("unexpected detail reply payload".to_string())),
        }
    }

    async fn comms_request(&self, method: &str, payload: BusPayload) -> Result<CommsReply, AppError> {
        match self.bus.request(method, payload).await {
            Err(e) => Err(e),
            Ok(Err(e)) => Err(agent_error(e)),
            Ok(Ok(BusPayload::CommsMessage { content: reply, session_id, .. })) => {
                Ok(CommsReply { reply, session_id })
            }
            Ok(Ok(_)) => Err(AppError::Comms("unexpected reply payload".to_string())),
        }
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is
    /// not keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

/// Map handler error codes to the channel-facing error families.
fn agent_error(e: BusError) -> AppError {
    match e.code {
        ERR_BUSY => AppError::Busy(e.message),
        ERR_SESSION_NOT_FOUND => AppError::NotFound(e.message),
        ERR_NOT_READY => AppError::Conflict(e.message),
        _ => AppError::Agent(e.to_string()),
    }
}
