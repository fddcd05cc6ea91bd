//! LLM provider abstraction and conversation types.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities — clone them freely.
//! Async is delegated to the underlying provider; the `chat` method is
//! `async fn` on the enum so callers need no trait-object machinery.
//!
//! [`Turn`] and [`Role`] are the caller-side conversation representation.
//! Upstream role strings (`"user"`/`"model"`) exist only inside the
//! provider modules — the mapping happens exactly once, at that boundary.

pub mod providers;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Conversation types ───────────────────────────────────────────────────────

/// Sender of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation: a sender role plus text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// Token accounting reported by the upstream API, when available.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A completed provider round-trip.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

// ── Error ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key: {0}")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Provider enum ────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait`
/// dependency. Adding a backend = new module + new variant + new `chat` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Gemini(providers::gemini::GeminiProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    /// Send the ordered turn sequence to the provider and return its reply.
    pub async fn chat(&self, turns: &[Turn]) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Gemini(p) => p.chat(turns).await,
            LlmProvider::Dummy(p) => p.chat(turns).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let turn = Turn::assistant("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn turn_constructors_set_roles() {
        assert_eq!(Turn::user("a").role, Role::User);
        assert_eq!(Turn::assistant("b").role, Role::Assistant);
    }
}
