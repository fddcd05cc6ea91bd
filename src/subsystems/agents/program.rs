//! `program` agent — the hand-off step after a completed intake.
//!
//! Takes a completed session's transcript, renders it into the
//! program-builder template, and asks the model for the workout program in
//! one round-trip. Sessions that have not reached the completion marker
//! are refused.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::llm::{Role, Turn};
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_INVALID_PARAMS, ERR_NOT_READY};

use super::prompt::PromptBuilder;
use super::{Agent, AgentsState, session_bus_error};

const PROGRAM_PROMPT_FILE: &str = "program.md";

const DEFAULT_PROGRAM_PROMPT: &str = "\
You are a fitness program builder. Below is a completed intake conversation in which
a user provided their age, height, weight, fitness goal, workout days, fitness level,
injuries, and diet preference.

Build a personalized weekly workout program for this user. Respect their available
workout days, experience level, and injuries. Include a short diet note matching
their stated preference.

Intake conversation:
{{transcript}}";

pub(crate) struct ProgramAgent;

impl Agent for ProgramAgent {
    fn id(&self) -> &str {
        "program"
    }

    fn handle(
        &self,
        _action: String,
        channel_id: String,
        _content: String,
        session_id: Option<String>,
        reply_tx: oneshot::Sender<BusResult>,
        state: Arc<AgentsState>,
    ) {
        tokio::spawn(async move {
            let result = generate(&state, channel_id, session_id.as_deref()).await;
            let _ = reply_tx.send(result);
        });
    }
}

async fn generate(state: &AgentsState, channel_id: String, session_id: Option<&str>) -> BusResult {
    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BusError::new(ERR_INVALID_PARAMS, "session_id is required"))?;

    let detail = state.sessions.detail(session_id).map_err(session_bus_error)?;
    if !detail.completed {
        return Err(BusError::new(
            ERR_NOT_READY,
            format!("intake is not complete yet for session {session_id}"),
        ));
    }

    let prompt = PromptBuilder::new(&state.prompts_dir)
        .layer_or(PROGRAM_PROMPT_FILE, DEFAULT_PROGRAM_PROMPT)
        .var("transcript", render_transcript(&detail.transcript))
        .build();

    match state.complete_chat(&channel_id, vec![Turn::user(prompt)]).await {
        Ok((program, usage)) => {
            info!(%session_id, "program generated");
            Ok(BusPayload::CommsMessage {
                channel_id,
                content: program,
                session_id: Some(session_id.to_string()),
                usage,
            })
        }
        Err(e) => {
            warn!(%session_id, error = %e, "program generation failed");
            Err(e)
        }
    }
}

/// Plain-text rendering of the transcript for the template.
fn render_transcript(transcript: &[Turn]) -> String {
    transcript
        .iter()
        .map(|t| {
            let speaker = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{speaker}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_renders_speaker_lines() {
        let transcript = vec![
            Turn::assistant("How old are you?"),
            Turn::user("30"),
        ];
        let rendered = render_transcript(&transcript);
        assert_eq!(rendered, "Assistant: How old are you?\nUser: 30");
    }

    #[test]
    fn default_template_has_transcript_slot() {
        assert!(DEFAULT_PROGRAM_PROMPT.contains("{{transcript}}"));
    }
}
