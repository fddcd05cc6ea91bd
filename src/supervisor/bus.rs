//! Supervisor bus — typed request/reply plumbing between subsystems.
//!
//! Requests carry a method string (`"prefix/..."`) and a [`BusPayload`];
//! the reply travels back over a per-request `oneshot` channel. Error codes
//! follow the JSON-RPC convention for the reserved range, with a few
//! application codes alongside.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};

use crate::error::AppError;
use crate::llm::{LlmUsage, Turn};

// ── Error codes ──────────────────────────────────────────────────────────────

pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERR_INVALID_PARAMS: i64 = -32602;
pub const ERR_INTERNAL: i64 = -32000;
/// An exchange is already in flight for the session.
pub const ERR_BUSY: i64 = -32001;
pub const ERR_SESSION_NOT_FOUND: i64 = -32004;
/// The session is not in the required state (e.g. intake incomplete).
pub const ERR_NOT_READY: i64 = -32005;

// ── Error ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BusError {
    pub code: i64,
    pub message: String,
}

impl BusError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

pub type BusResult = Result<BusPayload, BusError>;

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Typed payloads carried on the bus.
#[derive(Debug, Clone)]
pub enum BusPayload {
    Empty,
    /// A channel-originated message, or an agent's reply to one.
    CommsMessage {
        channel_id: String,
        content: String,
        session_id: Option<String>,
        usage: Option<LlmUsage>,
    },
    /// Full turn sequence for one completion round-trip.
    LlmChat {
        channel_id: String,
        turns: Vec<Turn>,
    },
    /// User-record sync request (insert-if-absent by identity id).
    UserSync {
        name: String,
        email: String,
        identity_id: String,
        image: Option<String>,
    },
    /// Session lookup by id.
    SessionQuery { session_id: String },
    /// Pre-serialized JSON reply body.
    JsonResponse { data: String },
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BusMessage {
    Request {
        id: u64,
        method: String,
        payload: BusPayload,
        reply_tx: oneshot::Sender<BusResult>,
    },
    /// Fire-and-forget; no reply expected.
    Notification { method: String, payload: BusPayload },
}

// ── Bus ──────────────────────────────────────────────────────────────────────

/// The receiving half lives in the supervisor run loop; [`BusHandle`]s are
/// cloned into every subsystem and channel that needs to issue requests.
pub struct SupervisorBus {
    pub rx: mpsc::Receiver<BusMessage>,
    pub handle: BusHandle,
}

impl SupervisorBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            rx,
            handle: BusHandle { tx, next_id: Arc::new(AtomicU64::new(1)) },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusMessage>,
    next_id: Arc<AtomicU64>,
}

impl BusHandle {
    /// Issue a request and await the handler's reply.
    ///
    /// The outer `Result` is transport-level (supervisor gone); the inner
    /// [`BusResult`] is the handler's own verdict.
    pub async fn request(
        &self,
        method: impl Into<String>,
        payload: BusPayload,
    ) -> Result<BusResult, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(BusMessage::Request { id, method: method.into(), payload, reply_tx })
            .await
            .map_err(|_| AppError::Comms("supervisor bus closed".into()))?;
        reply_rx
            .await
            .map_err(|_| AppError::Comms("reply channel dropped".into()))
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(
        &self,
        method: impl Into<String>,
        payload: BusPayload,
    ) -> Result<(), AppError> {
        self.tx
            .send(BusMessage::Notification { method: method.into(), payload })
            .await
            .map_err(|_| AppError::Comms("supervisor bus closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_error_display_includes_code() {
        let e = BusError::new(ERR_BUSY, "exchange in flight");
        assert!(e.to_string().contains("-32001"));
        assert!(e.to_string().contains("exchange in flight"));
    }

    #[tokio::test]
    async fn request_ids_are_unique() {
        let bus = SupervisorBus::new(4);
        let handle = bus.handle.clone();
        let mut rx = bus.rx;

        let collector = tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(BusMessage::Request { id, reply_tx, .. }) = rx.recv().await {
                ids.push(id);
                let _ = reply_tx.send(Ok(BusPayload::Empty));
                if ids.len() == 3 {
                    break;
                }
            }
            ids
        });

        for _ in 0..3 {
            handle.request("t/ping", BusPayload::Empty).await.unwrap().unwrap();
        }
        let ids = collector.await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn request_fails_when_bus_dropped() {
        let bus = SupervisorBus::new(1);
        let handle = bus.handle.clone();
        drop(bus.rx);
        let err = handle.request("t/ping", BusPayload::Empty).await.unwrap_err();
        assert!(err.to_string().contains("bus closed"));
    }
}
