//! Dummy provider — deterministic, keyless, records every request.
//!
//! Default behaviour echoes the last user turn. Tests script replies and
//! failures ahead of time, and can add an artificial per-call delay to
//! exercise in-flight handling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::llm::{LlmResponse, ProviderError, Role, Turn};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    /// Scripted outcomes consumed front-to-back; empty = echo mode.
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
    /// Every turn sequence this provider was asked to complete.
    seen: Arc<Mutex<Vec<Vec<Turn>>>>,
    delay: Option<Duration>,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that answers the given replies in order, then echoes.
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for r in replies {
            provider.push_reply(r);
        }
        provider
    }

    /// Sleep this long inside every `chat` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.into()));
        }
    }

    /// Snapshot of every request seen so far.
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub async fn chat(&self, turns: &[Turn]) -> Result<LlmResponse, ProviderError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(turns.to_vec());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(Ok(text)) => Ok(LlmResponse { text, usage: None }),
            Some(Err(message)) => Err(ProviderError::Request(message)),
            None => {
                let last_user = turns
                    .iter()
                    .rev()
                    .find(|t| t.role == Role::User)
                    .map(|t| t.text.as_str())
                    .unwrap_or("");
                Ok(LlmResponse {
                    text: format!("dummy: {last_user}"),
                    usage: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_last_user_turn_by_default() {
        let provider = DummyProvider::new();
        let reply = provider
            .chat(&[Turn::user("first"), Turn::assistant("mid"), Turn::user("last")])
            .await
            .unwrap();
        assert_eq!(reply.text, "dummy: last");
    }

    #[tokio::test]
    async fn scripted_replies_consumed_in_order() {
        let provider = DummyProvider::scripted(["one", "two"]);
        assert_eq!(provider.chat(&[Turn::user("a")]).await.unwrap().text, "one");
        assert_eq!(provider.chat(&[Turn::user("b")]).await.unwrap().text, "two");
        // Script exhausted — back to echo.
        assert_eq!(provider.chat(&[Turn::user("c")]).await.unwrap().text, "dummy: c");
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_request_error() {
        let provider = DummyProvider::new();
        provider.push_failure("upstream down");
        let err = provider.chat(&[Turn::user("a")]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(m) if m.contains("upstream down")));
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = DummyProvider::new();
        provider.chat(&[Turn::user("x")]).await.unwrap();
        provider.chat(&[Turn::user("y"), Turn::assistant("z")]).await.unwrap();
        let seen = provider.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1][1], Turn::assistant("z"));
    }
}
