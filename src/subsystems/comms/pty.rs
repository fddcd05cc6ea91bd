//! PTY (console) comms channel — the interactive intake screen.
//!
//! Starts an intake session, then reads lines from stdin and prints the
//! assistant's replies. Slash commands cover everything the screen's
//! buttons did: `/generate` is the "Generate Program" button, `/session`
//! shows the transcript.
//!
//! All supervisor communication goes through [`CommsState`] — this module
//! has no direct bus access. Runs until the `shutdown` token is cancelled
//! (Ctrl-C) or stdin is closed.
//!
//! Sends are sequential by construction (one read → one awaited reply), so
//! this channel never trips the per-session busy rejection; it exists for
//! concurrent callers like the HTTP channel.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

/// Shown instead of a reply when the upstream call fails. Presentation
/// only — it never enters the transcript.
const FALLBACK_REPLY: &str = "Sorry, I had trouble generating a response.";

// ── PtyChannel ───────────────────────────────────────────────────────────────

/// A PTY channel instance. Multiple instances would each get a unique id.
pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("─────────────────────────────────────────");
    println!(" Fitbot intake console  (Ctrl-C to quit)");
    println!(" /help for commands");
    println!("─────────────────────────────────────────");

    // One session per console run, opened up front so the greeting shows
    // before the first prompt.
    let session_id = match state.start_intake(&channel_id, None).await {
        Ok(started) => {
            println!("coach> {}", started.reply);
            let session_id = started.session_id.unwrap_or_default();
            state.report_event(CommsEvent::SessionStarted {
                channel_id: channel_id.clone(),
                session_id: session_id.clone(),
            });
            session_id
        }
        Err(e) => {
            warn!(%channel_id, error = %e, "failed to start intake session");
            return Err(e);
        }
    };

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("you> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received — closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim().to_string();
                        if input.is_empty() { continue; }
                        if input == "/quit" { break; }
                        handle_line(&channel_id, &state, &session_id, &input).await;
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

async fn handle_line(channel_id: &str, state: &CommsState, session_id: &str, input: &str) {
    match input {
        "/help" => {
            println!("  /session   show the collected conversation so far");
            println!("  /generate  build your program (after the intake is complete)");
            println!("  /quit      exit");
            println!("  anything else is sent to the assistant");
        }
        "/session" => match state.session_detail(session_id).await {
            Ok(data) => println!("{}", render_detail(&data)),
            Err(e) => {
                warn!(%session_id, error = %e, "session detail failed");
                println!("[pty] could not load the session transcript");
            }
        },
        "/generate" => match state.generate_program(channel_id, session_id).await {
            Ok(program) => {
                println!("── Your program ─────────────────────────");
                println!("{}", program.reply);
                println!("─────────────────────────────────────────");
            }
            Err(AppError::Conflict(_)) => {
                println!("coach> The intake isn't complete yet — keep chatting first.");
            }
            Err(e) => {
                warn!(%session_id, error = %e, "program generation failed");
                println!("coach> {FALLBACK_REPLY}");
            }
        },
        _ => {
            debug!(input = %input, "pty received line");
            match state.send_message(channel_id, input.to_string(), Some(session_id.to_string())).await {
                Ok(reply) => println!("coach> {}", reply.reply),
                Err(e) => {
                    // The user's turn stays in the transcript, unanswered;
                    // the apology is console output only.
                    warn!(%session_id, error = %e, "send_message failed");
                    println!("coach> {FALLBACK_REPLY}");
                }
            }
        }
    }
}

/// Compact console rendering of the session-detail JSON.
fn render_detail(data: &str) -> String {
    let Ok(detail) = serde_json::from_str::<serde_json::Value>(data) else {
        return data.to_string();
    };
    let mut out = String::new();
    if let Some(turns) = detail["transcript"].as_array() {
        for turn in turns {
            let speaker = match turn["role"].as_str() {
                Some("user") => "you",
                _ => "coach",
            };
            let text = turn["text"].as_str().unwrap_or_default();
            out.push_str(&format!("  {speaker}> {text}\n"));
        }
    }
    let completed = detail["completed"].as_bool().unwrap_or(false);
    out.push_str(if completed {
        "  [intake complete — /generate is ready]"
    } else {
        "  [intake in progress]"
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_detail_marks_progress_state() {
        let data = r#"{
            "session_id": "s1",
            "completed": false,
            "transcript": [
                {"role": "assistant", "text": "Hi!"},
                {"role": "user", "text": "hello"}
            ]
        }"#;
        let rendered = render_detail(data);
        assert!(rendered.contains("coach> Hi!"));
        assert!(rendered.contains("you> hello"));
        assert!(rendered.contains("in progress"));

        let done = data.replace("\"completed\": false", "\"completed\": true");
        assert!(render_detail(&done).contains("/generate is ready"));
    }

    #[test]
    fn render_detail_passes_through_bad_json() {
        assert_eq!(render_detail("not json"), "not json");
    }
}
