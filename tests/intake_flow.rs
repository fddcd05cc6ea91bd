//! Full-stack intake flow: supervisor + agents + scripted dummy provider.
//!
//! Drives the system the way a channel does — through `CommsState` — and
//! asserts the transcript-level guarantees: turn order is preserved, a
//! failed forward leaves the user turn unanswered but intact, concurrent
//! sends are rejected while an exchange is in flight, and the completion
//! marker gates program generation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fitbot::config::AgentsConfig;
use fitbot::error::AppError;
use fitbot::llm::providers::dummy::DummyProvider;
use fitbot::llm::{LlmProvider, Role};
use fitbot::subsystems::agents::AgentsSubsystem;
use fitbot::subsystems::comms::{CommsEvent, CommsState};
use fitbot::subsystems::llm::LlmSubsystem;
use fitbot::supervisor::{self, bus::SupervisorBus, dispatch::BusHandler};

const COMPLETION_REPLY: &str =
    "All set! Thank you for the information, kindly click Generate Program!";

struct Harness {
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
    // Keeps the event drain open for the lifetime of the test.
    _event_rx: mpsc::Receiver<CommsEvent>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn agents_config() -> AgentsConfig {
    AgentsConfig {
        default_agent: "intake".to_string(),
        channel_map: Default::default(),
        enabled: ["intake", "program"].iter().map(|s| s.to_string()).collect(),
        intake_user_name: None,
    }
}

fn start_stack(provider: DummyProvider) -> Harness {
    let bus = SupervisorBus::new(64);
    let bus_handle = bus.handle.clone();
    let shutdown = CancellationToken::new();

    let handlers: Vec<Box<dyn BusHandler>> = vec![
        Box::new(LlmSubsystem::with_provider(LlmProvider::Dummy(provider))),
        Box::new(AgentsSubsystem::new(
            agents_config(),
            bus_handle.clone(),
            PathBuf::from("config/prompts"),
        )),
    ];
    tokio::spawn(supervisor::run(bus, shutdown.clone(), handlers));

    let (event_tx, event_rx) = mpsc::channel(32);
    Harness {
        comms: Arc::new(CommsState::new(bus_handle, event_tx)),
        shutdown,
        _event_rx: event_rx,
    }
}

#[tokio::test]
async fn chat_flow_preserves_order_and_reaches_completion() {
    let provider = DummyProvider::scripted([
        "What is your age?",
        COMPLETION_REPLY,
        "Monday: squats. Wednesday: bench. Friday: deadlifts.",
    ]);
    let harness = start_stack(provider.clone());

    let started = harness.comms.start_intake("test0", Some("Ana".into())).await.unwrap();
    assert!(started.reply.starts_with("Hi Ana!"));
    let session_id = started.session_id.expect("start returns a session id");

    let first = harness
        .comms
        .send_message("test0", "hello".into(), Some(session_id.clone()))
        .await
        .unwrap();
    assert_eq!(first.reply, "What is your age?");

    let second = harness
        .comms
        .send_message("test0", "30".into(), Some(session_id.clone()))
        .await
        .unwrap();
    assert_eq!(second.reply, COMPLETION_REPLY);

    // Transcript: greeting, user, reply, user, reply — in that order.
    let detail = harness.comms.session_detail(&session_id).await.unwrap();
    let detail: serde_json::Value = serde_json::from_str(&detail).unwrap();
    assert_eq!(detail["completed"], true);
    let transcript = detail["transcript"].as_array().unwrap();
    let roles: Vec<&str> = transcript.iter().map(|t| t["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["assistant", "user", "assistant", "user", "assistant"]);
    assert_eq!(transcript[1]["text"], "hello");
    assert_eq!(transcript[3]["text"], "30");

    // The forwarded sequence bracketed the history with the instruction and
    // the fixed continuation, and never led with an assistant turn.
    let requests = provider.requests();
    let second_request = &requests[1];
    assert_eq!(second_request.first().unwrap().role, Role::User);
    assert_eq!(second_request.last().unwrap().text, "Continue");
    let texts: Vec<&str> = second_request.iter().map(|t| t.text.as_str()).collect();
    assert!(texts.contains(&"hello"));
    assert!(texts.contains(&"What is your age?"));
    assert!(texts.contains(&"30"));
    // Relative order of the real turns is intact.
    let hello_pos = texts.iter().position(|t| *t == "hello").unwrap();
    let age_pos = texts.iter().position(|t| *t == "What is your age?").unwrap();
    let thirty_pos = texts.iter().position(|t| *t == "30").unwrap();
    assert!(hello_pos < age_pos && age_pos < thirty_pos);

    // Completed session → the program hand-off works.
    let program = harness.comms.generate_program("test0", &session_id).await.unwrap();
    assert!(program.reply.contains("squats"));
}

#[tokio::test]
async fn failed_forward_leaves_transcript_intact_and_retryable() {
    let provider = DummyProvider::new();
    provider.push_failure("upstream unreachable");
    provider.push_reply("What is your age?");
    let harness = start_stack(provider);

    let started = harness.comms.start_intake("test0", None).await.unwrap();
    let session_id = started.session_id.unwrap();

    let err = harness
        .comms
        .send_message("test0", "hello".into(), Some(session_id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Agent(_)), "got: {err}");

    // User turn present and unanswered; session not complete.
    let detail = harness.comms.session_detail(&session_id).await.unwrap();
    let detail: serde_json::Value = serde_json::from_str(&detail).unwrap();
    let transcript = detail["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1]["role"], "user");
    assert_eq!(transcript[1]["text"], "hello");
    assert_eq!(detail["completed"], false);

    // The in-flight flag was released — a retry succeeds.
    let retry = harness
        .comms
        .send_message("test0", "hello again".into(), Some(session_id.clone()))
        .await
        .unwrap();
    assert_eq!(retry.reply, "What is your age?");
}

#[tokio::test]
async fn concurrent_send_is_rejected_while_in_flight() {
    let provider =
        DummyProvider::scripted(["slow reply"]).with_delay(Duration::from_millis(200));
    let harness = start_stack(provider);

    let started = harness.comms.start_intake("test0", None).await.unwrap();
    let session_id = started.session_id.unwrap();

    let first = harness.comms.send_message("test0", "first".into(), Some(session_id.clone()));
    let second = async {
        // Let the first send win the race into the registry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness
            .comms
            .send_message("test0", "second".into(), Some(session_id.clone()))
            .await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().reply, "slow reply");
    assert!(matches!(second.unwrap_err(), AppError::Busy(_)));

    // The rejected send never touched the transcript.
    let detail = harness.comms.session_detail(&session_id).await.unwrap();
    let detail: serde_json::Value = serde_json::from_str(&detail).unwrap();
    let transcript = detail["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1]["text"], "first");
}

#[tokio::test]
async fn program_refused_until_intake_complete() {
    let provider = DummyProvider::scripted(["What is your age?"]);
    let harness = start_stack(provider);

    let started = harness.comms.start_intake("test0", None).await.unwrap();
    let session_id = started.session_id.unwrap();

    harness
        .comms
        .send_message("test0", "hello".into(), Some(session_id.clone()))
        .await
        .unwrap();

    let err = harness.comms.generate_program("test0", &session_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got: {err}");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = start_stack(DummyProvider::new());

    let err = harness
        .comms
        .send_message("test0", "hi".into(), Some("no-such-session".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");

    let err = harness.comms.session_detail("no-such-session").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}
