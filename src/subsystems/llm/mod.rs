//! LLM subsystem — routes `llm/*` bus requests to the configured provider.
//!
//! Implements [`BusHandler`] with prefix `"llm"` so the supervisor can
//! register it generically. Each request is resolved in a spawned task;
//! the supervisor loop is never blocked on I/O.

use tokio::sync::oneshot;
use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError, providers};
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_INTERNAL, ERR_METHOD_NOT_FOUND};
use crate::supervisor::dispatch::BusHandler;

pub struct LlmSubsystem {
    provider: LlmProvider,
}

impl LlmSubsystem {
    /// Construct the subsystem. `api_key` comes from `GEMINI_API_KEY` env —
    /// never TOML.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let provider = providers::build(config, api_key)?;
        Ok(Self { provider })
    }

    /// Wrap an already-built provider (tests inject scripted dummies here).
    pub fn with_provider(provider: LlmProvider) -> Self {
        Self { provider }
    }
}

impl BusHandler for LlmSubsystem {
    fn prefix(&self) -> &str {
        "llm"
    }

    /// Route an `llm/*` request. Ownership of `reply_tx` is moved into a
    /// spawned task — the supervisor loop returns immediately.
    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        match payload {
            BusPayload::LlmChat { channel_id, turns } if method == "llm/chat" => {
                let provider = self.provider.clone();
                debug!(%channel_id, turns = turns.len(), "dispatching to llm provider");
                tokio::spawn(async move {
                    let result = provider
                        .chat(&turns)
                        .await
                        .map(|resp| {
                            if let Some(u) = &resp.usage {
                                debug!(
                                    input_tokens = u.input_tokens,
                                    output_tokens = u.output_tokens,
                                    total_tokens = u.total_tokens,
                                    "llm usage"
                                );
                            }
                            BusPayload::CommsMessage {
                                channel_id,
                                content: resp.text,
                                session_id: None,
                                usage: resp.usage,
                            }
                        })
                        .map_err(|e| BusError::new(ERR_INTERNAL, e.to_string()));
                    let _ = reply_tx.send(result);
                });
            }
            _ => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_METHOD_NOT_FOUND,
                    format!("unsupported llm method: {method}"),
                )));
            }
        }
    }
}
