//! Axum handlers for `/api/*` routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`]. Error families map to status codes:
//! busy and not-ready → 409, unknown session → 404, upstream failure →
//! 502, timeout → 504.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::AppError;

use super::AxumState;

/// LLM round-trips can be slow; everything else is local.
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);
const LOCAL_TIMEOUT: Duration = Duration::from_secs(10);

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct StartRequest {
    #[serde(default)]
    user_name: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct MessageRequest {
    session_id: String,
    message: String,
}

#[derive(Deserialize)]
pub(super) struct ProgramRequest {
    session_id: String,
}

#[derive(Deserialize)]
pub(super) struct UserSyncRequest {
    name: String,
    email: String,
    identity_id: String,
    #[serde(default)]
    image: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

fn error_response(e: AppError) -> Response {
    match e {
        AppError::Busy(_) => (StatusCode::CONFLICT, json_error("busy", e)).into_response(),
        AppError::Conflict(_) => (StatusCode::CONFLICT, json_error("conflict", e)).into_response(),
        AppError::NotFound(_) => (StatusCode::NOT_FOUND, json_error("not_found", e)).into_response(),
        other => (StatusCode::BAD_GATEWAY, json_error("internal", other)).into_response(),
    }
}

fn timeout_response(what: &str) -> Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        json_error("timeout", format!("{what} timed out")),
    )
        .into_response()
}

fn json_body(data: String) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        data,
    )
        .into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// POST /api/intake/start
pub(super) async fn intake_start(
    State(state): State<AxumState>,
    Json(req): Json<StartRequest>,
) -> Response {
    match tokio::time::timeout(
        LOCAL_TIMEOUT,
        state.comms.start_intake(&state.channel_id, req.user_name),
    )
    .await
    {
        Ok(Ok(started)) => (
            StatusCode::OK,
            Json(json!({
                "session_id": started.session_id,
                "greeting": started.reply,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "intake start failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("intake start"),
    }
}

/// POST /api/intake/message
pub(super) async fn intake_message(
    State(state): State<AxumState>,
    Json(req): Json<MessageRequest>,
) -> Response {
    match tokio::time::timeout(
        CHAT_TIMEOUT,
        state
            .comms
            .send_message(&state.channel_id, req.message, Some(req.session_id)),
    )
    .await
    {
        Ok(Ok(reply)) => (
            StatusCode::OK,
            Json(json!({
                "session_id": reply.session_id,
                "reply": reply.reply,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "message send failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("chat request"),
    }
}

/// POST /api/program
pub(super) async fn program(
    State(state): State<AxumState>,
    Json(req): Json<ProgramRequest>,
) -> Response {
    match tokio::time::timeout(
        CHAT_TIMEOUT,
        state.comms.generate_program(&state.channel_id, &req.session_id),
    )
    .await
    {
        Ok(Ok(reply)) => (
            StatusCode::OK,
            Json(json!({
                "session_id": reply.session_id,
                "program": reply.reply,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "program generation failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("program generation"),
    }
}

/// POST /api/users/sync
pub(super) async fn users_sync(
    State(state): State<AxumState>,
    Json(req): Json<UserSyncRequest>,
) -> Response {
    match tokio::time::timeout(
        LOCAL_TIMEOUT,
        state
            .comms
            .sync_user(req.name, req.email, req.identity_id, req.image),
    )
    .await
    {
        Ok(Ok(data)) => json_body(data),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "user sync failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("user sync"),
    }
}

/// GET /api/session/{session_id}
pub(super) async fn session_detail(
    State(state): State<AxumState>,
    Path(session_id): Path<String>,
) -> Response {
    match tokio::time::timeout(LOCAL_TIMEOUT, state.comms.session_detail(&session_id)).await {
        Ok(Ok(data)) => json_body(data),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, %session_id, "session detail failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("session detail"),
    }
}
