//! Gemini chat completion provider (`models/{model}:generateContent`).
//!
//! Exposes a single `chat(&[Turn]) -> LlmResponse` interface matching the
//! rest of the `LlmProvider` abstraction. All Gemini wire types are private
//! to this module — callers never see them. Turn-sequence shaping (system
//! instruction, continuation turn) belongs at the agent layer; this
//! provider is one round-trip and stateless.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{LlmResponse, LlmUsage, ProviderError, Role, Turn};

// ── Public provider ──────────────────────────────────────────────────────────

/// Adapter for the Gemini `generateContent` REST endpoint.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    response_mime_type: Option<String>,
    api_key: String,
}

impl GeminiProvider {
    /// Build a provider from config values and the API key.
    ///
    /// The key is sent as the `x-goog-api-key` header on every request.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        top_p: f32,
        response_mime_type: Option<String>,
        timeout_seconds: u64,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url,
            model,
            temperature,
            top_p,
            response_mime_type,
            api_key,
        })
    }

    /// Send the ordered turn sequence and return the first candidate's text.
    ///
    /// Exactly one round-trip: no retry, no streaming. Transport failures,
    /// HTTP errors, and empty candidates all surface as
    /// [`ProviderError::Request`].
    pub async fn chat(&self, turns: &[Turn]) -> Result<LlmResponse, ProviderError> {
        let payload = GenerateContentRequest {
            contents: turns.iter().map(Content::from_turn).collect(),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: self.top_p,
                response_mime_type: self.response_mime_type.clone(),
            },
        };

        debug!(
            model = %self.model,
            turns = turns.len(),
            temperature = self.temperature,
            "sending generateContent request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full request payload");
        }

        let url = format!("{}/models/{}:generateContent", self.api_base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "generateContent HTTP request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| {
                error!(error = %e, "failed to deserialize generateContent response");
                ProviderError::Request(format!("failed to parse response body: {e}"))
            })?;

        debug!(candidates = parsed.candidates.len(), "received generateContent response");

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing candidate in response".into()))?;

        let usage = parsed.usage_metadata.map(|u| LlmUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(LlmResponse { text, usage })
    }
}

// ── Private wire types ───────────────────────────────────────────────────────

/// Map a local role to the upstream role string. The only place the
/// `Assistant → "model"` translation happens.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            role: wire_role(turn.role).to_string(),
            parts: vec![Part { text: turn.text.clone() }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

// Error envelope returned by the Gemini API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let detail = match (env.error.code, env.error.status) {
            (Some(code), Some(s)) => format!(" [code={code} status={s}]"),
            (Some(code), None) => format!(" [code={code}]"),
            (None, Some(s)) => format!(" [status={s}]"),
            (None, None) => String::new(),
        };
        format!("HTTP {status}{detail}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "generateContent returned HTTP error");
    Err(ProviderError::Request(message))
}
