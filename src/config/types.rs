//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs that subsystems consume.
//! Raw TOML deserialization types live in `raw.rs`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

// ── Comms ───────────────────────────────────────────────────────────────────

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Whether the PTY channel is explicitly enabled.
    pub enabled: bool,
}

/// Axum HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct AxumChannelConfig {
    /// Whether the axum channel is explicitly enabled.
    pub enabled: bool,
    /// Socket address to bind the axum listener to.
    pub bind: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub axum_channel: AxumChannelConfig,
}

// ── LLM ─────────────────────────────────────────────────────────────────────

/// Gemini `generateContent` provider configuration.
/// Populated from `[llm.gemini]` in the TOML.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base URL; the model path is appended per request.
    pub api_base_url: String,
    /// Model name, e.g. `gemini-2.0-flash-001`.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus-sampling threshold.
    pub top_p: f32,
    /// Optional response MIME type (e.g. `application/json`).
    /// Omitted from the request when unset.
    pub response_mime_type: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"gemini"` or `"dummy"`).
    pub provider: String,
    /// Config for the Gemini provider (`[llm.gemini]`).
    pub gemini: GeminiConfig,
}

// ── Agents ──────────────────────────────────────────────────────────────────

/// Agents subsystem configuration.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    /// Agent that handles messages with no explicit routing.
    pub default_agent: String,
    /// channel_id -> agent_id overrides (from `[agents.routing]`).
    pub channel_map: HashMap<String, String>,
    /// Set of agent IDs whose config section has `enabled` != false.
    pub enabled: HashSet<String>,
    /// Display name used in the intake greeting when the channel
    /// does not supply one.
    pub intake_user_name: Option<String>,
}

// ── Users ───────────────────────────────────────────────────────────────────

/// User-store configuration.
#[derive(Debug, Clone)]
pub struct UsersConfig {
    /// SQLite file name, resolved relative to `work_dir`.
    pub db_file: String,
}

// ── Config (root) ───────────────────────────────────────────────────────────

/// Fully-resolved supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Directory holding prompt template layers.
    pub prompts_dir: PathBuf,
    pub comms: CommsConfig,
    pub agents: AgentsConfig,
    pub llm: LlmConfig,
    pub users: UsersConfig,
    /// API key from `GEMINI_API_KEY` env — never sourced from TOML.
    pub gemini_api_key: Option<String>,
}

impl Config {
    /// Returns `true` if the PTY channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the axum channel should be loaded.
    pub fn comms_axum_should_load(&self) -> bool {
        self.comms.axum_channel.enabled
    }

    /// Absolute path of the user-store SQLite file.
    pub fn users_db_path(&self) -> PathBuf {
        self.work_dir.join(&self.users.db_file)
    }
}
