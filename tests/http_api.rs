//! Router-level tests for the axum channel, driven with
//! `tower::ServiceExt::oneshot` — no sockets, full supervisor stack behind
//! the handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use fitbot::config::AgentsConfig;
use fitbot::llm::LlmProvider;
use fitbot::llm::providers::dummy::DummyProvider;
use fitbot::subsystems::agents::AgentsSubsystem;
use fitbot::subsystems::comms::axum_channel::{AxumState, build_router};
use fitbot::subsystems::comms::{CommsEvent, CommsState};
use fitbot::subsystems::llm::LlmSubsystem;
use fitbot::subsystems::users::UsersSubsystem;
use fitbot::supervisor::{self, bus::SupervisorBus, dispatch::BusHandler};

const COMPLETION_REPLY: &str =
    "All set! Thank you for the information, kindly click Generate Program!";

struct Harness {
    router: Router,
    shutdown: CancellationToken,
    _event_rx: mpsc::Receiver<CommsEvent>,
    _db_dir: tempfile::TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn start_stack(provider: DummyProvider) -> Harness {
    let db_dir = tempfile::tempdir().unwrap();
    let bus = SupervisorBus::new(64);
    let bus_handle = bus.handle.clone();
    let shutdown = CancellationToken::new();

    let agents_config = AgentsConfig {
        default_agent: "intake".to_string(),
        channel_map: Default::default(),
        enabled: ["intake", "program"].iter().map(|s| s.to_string()).collect(),
        intake_user_name: None,
    };

    let handlers: Vec<Box<dyn BusHandler>> = vec![
        Box::new(LlmSubsystem::with_provider(LlmProvider::Dummy(provider))),
        Box::new(AgentsSubsystem::new(
            agents_config,
            bus_handle.clone(),
            PathBuf::from("config/prompts"),
        )),
        Box::new(UsersSubsystem::new(&db_dir.path().join("users.db")).unwrap()),
    ];
    tokio::spawn(supervisor::run(bus, shutdown.clone(), handlers));

    let (event_tx, event_rx) = mpsc::channel(32);
    let comms = Arc::new(CommsState::new(bus_handle, event_tx));
    let router = build_router(AxumState::new("axum0", comms));

    Harness { router, shutdown, _event_rx: event_rx, _db_dir: db_dir }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_responds_ok() {
    let harness = start_stack(DummyProvider::new());
    let (status, body) = call(&harness.router, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn user_sync_is_idempotent_over_http() {
    let harness = start_stack(DummyProvider::new());
    let payload = json!({
        "name": "Ana",
        "email": "ana@example.com",
        "identity_id": "auth|ana",
        "image": "https://example.com/ana.png"
    });

    let (status, first) = call(&harness.router, "POST", "/api/users/sync", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created"], true);

    let (status, second) = call(&harness.router, "POST", "/api/users/sync", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn chat_flow_over_http() {
    let harness = start_stack(DummyProvider::scripted([
        "What is your age?",
        COMPLETION_REPLY,
        "Your program: train hard.",
    ]));

    let (status, started) = call(
        &harness.router,
        "POST",
        "/api/intake/start",
        Some(json!({ "user_name": "Ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(started["greeting"].as_str().unwrap().starts_with("Hi Ana!"));
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let (status, reply) = call(
        &harness.router,
        "POST",
        "/api/intake/message",
        Some(json!({ "session_id": session_id, "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["reply"], "What is your age?");

    // Program before completion → 409 conflict.
    let (status, body) = call(
        &harness.router,
        "POST",
        "/api/program",
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, reply) = call(
        &harness.router,
        "POST",
        "/api/intake/message",
        Some(json!({ "session_id": session_id, "message": "30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["reply"], COMPLETION_REPLY);

    let (status, detail) = call(
        &harness.router,
        "GET",
        &format!("/api/session/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["completed"], true);
    assert_eq!(detail["transcript"].as_array().unwrap().len(), 5);

    let (status, program) = call(
        &harness.router,
        "POST",
        "/api/program",
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(program["program"].as_str().unwrap().contains("train hard"));
}

#[tokio::test]
async fn unknown_session_maps_to_404() {
    let harness = start_stack(DummyProvider::new());

    let (status, body) = call(
        &harness.router,
        "POST",
        "/api/intake/message",
        Some(json!({ "session_id": "no-such-session", "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = call(&harness.router, "GET", "/api/session/no-such-session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_failure_maps_to_502_and_preserves_transcript() {
    let provider = DummyProvider::new();
    provider.push_failure("upstream unreachable");
    let harness = start_stack(provider);

    let (_, started) = call(&harness.router, "POST", "/api/intake/start", Some(json!({}))).await;
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &harness.router,
        "POST",
        "/api/intake/message",
        Some(json!({ "session_id": session_id, "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "internal");

    // The user's turn is still there, unanswered.
    let (status, detail) = call(
        &harness.router,
        "GET",
        &format!("/api/session/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let transcript = detail["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1]["text"], "hello");
}
