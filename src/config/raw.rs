//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use std::collections::HashMap;

use serde::Deserialize;

// ── Top-level ───────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub supervisor: RawSupervisor,
    #[serde(default)]
    pub comms: RawComms,
    #[serde(default)]
    pub agents: RawAgents,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub users: RawUsers,
}

#[derive(Deserialize)]
pub(super) struct RawSupervisor {
    pub bot_name: String,
    pub work_dir: String,
    pub log_level: String,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
}

// ── Comms ───────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawComms {
    #[serde(default)]
    pub pty: RawPty,
    #[serde(default)]
    pub axum_channel: RawAxumChannel,
}

#[derive(Deserialize)]
pub(super) struct RawPty {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: default_true() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawAxumChannel {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

impl Default for RawAxumChannel {
    fn default() -> Self {
        Self { enabled: default_false(), bind: default_http_bind() }
    }
}

// ── LLM ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub gemini: RawGeminiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), gemini: RawGeminiConfig::default() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawGeminiConfig {
    #[serde(default = "default_gemini_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_temperature")]
    pub temperature: f32,
    #[serde(default = "default_gemini_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub response_mime_type: Option<String>,
    #[serde(default = "default_gemini_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawGeminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            temperature: default_gemini_temperature(),
            top_p: default_gemini_top_p(),
            response_mime_type: None,
            timeout_seconds: default_gemini_timeout_seconds(),
        }
    }
}

// ── Agents ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawAgents {
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// channel_id -> agent_id
    #[serde(default)]
    pub routing: HashMap<String, String>,
    #[serde(default)]
    pub intake: RawIntakeAgent,
    #[serde(default)]
    pub program: RawProgramAgent,
}

impl Default for RawAgents {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            routing: HashMap::new(),
            intake: RawIntakeAgent::default(),
            program: RawProgramAgent::default(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawIntakeAgent {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl Default for RawIntakeAgent {
    fn default() -> Self {
        Self { enabled: default_true(), user_name: None }
    }
}

#[derive(Deserialize)]
pub(super) struct RawProgramAgent {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RawProgramAgent {
    fn default() -> Self {
        Self { enabled: default_true() }
    }
}

// ── Users ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawUsers {
    #[serde(default = "default_users_db_file")]
    pub db_file: String,
}

impl Default for RawUsers {
    fn default() -> Self {
        Self { db_file: default_users_db_file() }
    }
}

// ── Defaults ────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_http_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_llm_provider() -> String {
    "dummy".to_string()
}

fn default_gemini_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-001".to_string()
}

fn default_gemini_temperature() -> f32 {
    0.4
}

fn default_gemini_top_p() -> f32 {
    0.9
}

fn default_gemini_timeout_seconds() -> u64 {
    60
}

fn default_agent() -> String {
    "intake".to_string()
}

fn default_prompts_dir() -> String {
    "config/prompts".to_string()
}

fn default_users_db_file() -> String {
    "users.db".to_string()
}
