//! `intake` agent — conversational fitness-profile collection.
//!
//! The agent owns no validation logic: field collection, re-asking on bad
//! answers, and completion detection are all delegated to the model through
//! the intake instruction. Locally it only manages the session transcript,
//! shapes the upstream turn sequence, and watches replies for the
//! completion marker the instruction tells the model to emit.
//!
//! ## Turn-sequence shaping
//!
//! The upstream session must begin with a user turn, so the locally
//! injected greeting is dropped from the head of the transcript. The
//! intake instruction is prepended as the first user turn, and a fixed
//! `"Continue"` user turn is appended as the continuation request.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::llm::{Role, Turn};
use crate::supervisor::bus::{
    BusError, BusPayload, BusResult, ERR_INVALID_PARAMS, ERR_METHOD_NOT_FOUND,
};

use super::prompt::PromptBuilder;
use super::{Agent, AgentsState, session_bus_error};

/// Phrase the instruction tells the model to emit once every field is
/// collected and confirmed. Substring-matched against each reply.
pub const COMPLETION_MARKER: &str = "kindly click Generate Program";

/// Fixed continuation request sent after the seeded history.
const CONTINUATION_MSG: &str = "Continue";

/// Template file under the prompts directory; the constant below is the
/// in-binary fallback when the file is absent.
const INTAKE_PROMPT_FILE: &str = "intake.md";

const DEFAULT_INTAKE_PROMPT: &str = "\
You are a helpful fitness assistant. Your job is to collect and validate the following fields:
- Age (13-100)
- Height (in cm, 100-250)
- Weight (in kg or lbs, 30-200kg or 66-440lbs)
- Fitness goal (e.g., lose fat, build muscle)
- Workout days (e.g., monday, wednesday, friday, etc.)
- Fitness level (e.g., beginner, intermediate, advanced)
- Injuries (e.g., torn ACL, wrist injuries, etc.)
- Diet preference (e.g., vegetarian, keto, none)

Ask one question at a time. If the answer is missing, irrelevant, or invalid, ask again.
Once all valid values are collected, confirm the information listing the values one by one,
and after confirmation say: \"Thank you for the information, kindly click Generate Program!\"";

pub(crate) struct IntakeAgent;

impl Agent for IntakeAgent {
    fn id(&self) -> &str {
        "intake"
    }

    fn handle(
        &self,
        action: String,
        channel_id: String,
        content: String,
        session_id: Option<String>,
        reply_tx: oneshot::Sender<BusResult>,
        state: Arc<AgentsState>,
    ) {
        tokio::spawn(async move {
            let result = match action.as_str() {
                "start" => start(&state, channel_id, &content),
                "" | "chat" => chat(&state, channel_id, &content, session_id.as_deref()).await,
                other => Err(BusError::new(
                    ERR_METHOD_NOT_FOUND,
                    format!("unknown intake action: {other}"),
                )),
            };
            let _ = reply_tx.send(result);
        });
    }
}

/// Create a session and seed it with the greeting turn.
///
/// `user_name` may be empty; the config-level name and then a generic
/// fallback apply in that order.
fn start(state: &AgentsState, channel_id: String, user_name: &str) -> BusResult {
    let name = [user_name, state.default_user_name.as_deref().unwrap_or("")]
        .into_iter()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .unwrap_or("there")
        .to_string();

    let greeting = Turn::assistant(format!(
        "Hi {name}! I'm your AI fitness assistant. Let's get started!"
    ));
    let session_id = state.sessions.create(&name, greeting.clone());

    info!(%session_id, %channel_id, "intake session started");

    Ok(BusPayload::CommsMessage {
        channel_id,
        content: greeting.text,
        session_id: Some(session_id),
        usage: None,
    })
}

/// One chat exchange: append, forward, commit (or abort on failure).
async fn chat(
    state: &AgentsState,
    channel_id: String,
    content: &str,
    session_id: Option<&str>,
) -> BusResult {
    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BusError::new(ERR_INVALID_PARAMS, "session_id is required"))?;

    let transcript = state
        .sessions
        .begin_exchange(session_id, content)
        .map_err(session_bus_error)?;

    let instruction = intake_instruction(state);
    let turns = build_llm_turns(&instruction, &transcript);

    match state.complete_chat(&channel_id, turns).await {
        Ok((reply, usage)) => {
            let completed = reply.contains(COMPLETION_MARKER);
            state
                .sessions
                .commit_reply(session_id, &reply, completed)
                .map_err(session_bus_error)?;
            if completed {
                info!(%session_id, "intake complete — ready for program generation");
            }
            Ok(BusPayload::CommsMessage {
                channel_id,
                content: reply,
                session_id: Some(session_id.to_string()),
                usage,
            })
        }
        Err(e) => {
            // The user turn stays in the transcript, unanswered; only the
            // in-flight flag is released so the user can try again.
            state.sessions.abort_exchange(session_id);
            warn!(%session_id, error = %e, "intake forward failed — turn left unanswered");
            Err(e)
        }
    }
}

fn intake_instruction(state: &AgentsState) -> String {
    PromptBuilder::new(&state.prompts_dir)
        .layer_or(INTAKE_PROMPT_FILE, DEFAULT_INTAKE_PROMPT)
        .build()
}

/// Shape the upstream turn sequence from a transcript snapshot.
pub(crate) fn build_llm_turns(instruction: &str, transcript: &[Turn]) -> Vec<Turn> {
    let history = match transcript.first() {
        Some(first) if first.role == Role::Assistant => &transcript[1..],
        _ => transcript,
    };

    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(Turn::user(instruction));
    turns.extend_from_slice(history);
    turns.push(Turn::user(CONTINUATION_MSG));
    turns
}
