//! Agents subsystem — receives agent-targeted requests and routes to agents.
//!
//! [`Agent`] is the extension trait: each agent is a `Send + Sync` struct
//! registered in the subsystem by name. Built-in agents (`intake`,
//! `program`) live in this module's submodules.
//!
//! [`AgentsSubsystem`] implements [`BusHandler`] with prefix `"agents"` and
//! is never blocked: agents spawn a task per request and resolve the reply
//! channel from there.

mod intake;
mod program;
pub mod prompt;
pub mod sessions;

pub use intake::COMPLETION_MARKER;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::AgentsConfig;
use crate::llm::{LlmUsage, Turn};
use crate::supervisor::bus::{
    BusError, BusHandle, BusPayload, BusResult, ERR_BUSY, ERR_INTERNAL, ERR_METHOD_NOT_FOUND,
    ERR_SESSION_NOT_FOUND,
};
use crate::supervisor::dispatch::BusHandler;

use sessions::{SessionError, SessionRegistry};

// ── AgentsState ──────────────────────────────────────────────────────────────

/// Shared capability surface passed to agent plugins.
///
/// The raw [`BusHandle`] is private — agents call typed methods and cannot
/// address arbitrary bus targets.
pub struct AgentsState {
    /// Supervisor bus — private to this module.
    bus: BusHandle,
    /// In-memory intake sessions, shared by all agents.
    pub sessions: Arc<SessionRegistry>,
    /// Directory holding prompt template layers.
    pub prompts_dir: PathBuf,
    /// Greeting name used when the channel supplies none.
    pub default_user_name: Option<String>,
}

impl AgentsState {
    /// Forward a turn sequence to the LLM subsystem; returns the reply text
    /// and usage.
    pub(crate) async fn complete_chat(
        &self,
        channel_id: &str,
        turns: Vec<Turn>,
    ) -> Result<(String, Option<LlmUsage>), BusError> {
        let result = self
            .bus
            .request(
                "llm/chat",
                BusPayload::LlmChat { channel_id: channel_id.to_string(), turns },
            )
            .await;
        match result {
            Ok(Ok(BusPayload::CommsMessage { content, usage, .. })) => Ok((content, usage)),
            Ok(Ok(_)) => Err(BusError::new(ERR_INTERNAL, "unexpected llm reply payload")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(BusError::new(ERR_INTERNAL, e.to_string())),
        }
    }
}

/// Translate registry errors into bus error codes.
pub(crate) fn session_bus_error(e: SessionError) -> BusError {
    match e {
        SessionError::NotFound(_) => BusError::new(ERR_SESSION_NOT_FOUND, e.to_string()),
        SessionError::Busy(_) => BusError::new(ERR_BUSY, e.to_string()),
    }
}

// ── Agent trait ──────────────────────────────────────────────────────────────

/// An agent loaded by the agents subsystem.
///
/// Implementations must be `Send + Sync` and must not block the caller:
/// spawn a task and resolve `reply_tx` when done.
pub trait Agent: Send + Sync {
    /// Unique agent identifier (matches config name, e.g. `"intake"`).
    fn id(&self) -> &str;

    /// Handle an incoming request.
    fn handle(
        &self,
        action: String,
        channel_id: String,
        content: String,
        session_id: Option<String>,
        reply_tx: oneshot::Sender<BusResult>,
        state: Arc<AgentsState>,
    );
}

// ── AgentsSubsystem ──────────────────────────────────────────────────────────

/// Agents subsystem.
///
/// Method grammar:
/// - `agents`                      -> default agent, default action
/// - `agents/{agent_id}`           -> explicit agent, default action
/// - `agents/{agent_id}/{action}`  -> explicit agent + action
///
/// One reserved route sits outside the grammar:
/// - `agents/sessions/detail`      -> session transcript query
pub struct AgentsSubsystem {
    state: Arc<AgentsState>,
    agents: HashMap<String, Box<dyn Agent>>,
    default_agent: String,
    channel_map: HashMap<String, String>,
    enabled_agents: HashSet<String>,
}

impl AgentsSubsystem {
    pub fn new(config: AgentsConfig, bus: BusHandle, prompts_dir: PathBuf) -> Self {
        // Default falls back to "intake" if config omits it entirely.
        let default_agent = if config.default_agent.is_empty() {
            "intake".to_string()
        } else {
            config.default_agent
        };

        // Register all known built-in agents.
        // Uses agent.id() as the key so the trait method is the single
        // source of truth for each agent's identity.
        let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
        for agent in [
            Box::new(intake::IntakeAgent) as Box<dyn Agent>,
            Box::new(program::ProgramAgent) as Box<dyn Agent>,
        ] {
            agents.insert(agent.id().to_string(), agent);
        }

        Self {
            state: Arc::new(AgentsState {
                bus,
                sessions: Arc::new(SessionRegistry::new()),
                prompts_dir,
                default_user_name: config.intake_user_name,
            }),
            agents,
            default_agent,
            channel_map: config.channel_map,
            enabled_agents: config.enabled,
        }
    }

    fn resolve_agent<'a>(
        &'a self,
        method_agent_id: Option<&'a str>,
        channel_id: &str,
    ) -> Result<&'a str, BusError> {
        if let Some(agent_id) = method_agent_id {
            return if self.enabled_agents.contains(agent_id) {
                Ok(agent_id)
            } else {
                Err(BusError::new(
                    ERR_METHOD_NOT_FOUND,
                    format!("agent not found: {agent_id}"),
                ))
            };
        }

        if let Some(mapped) = self.channel_map.get(channel_id)
            && self.enabled_agents.contains(mapped)
        {
            return Ok(mapped.as_str());
        }

        // Use the default agent only if it is enabled, or if no agents have
        // been explicitly enabled (empty set = no restrictions, for minimal
        // and test configurations).
        if self.enabled_agents.is_empty() || self.enabled_agents.contains(&self.default_agent) {
            return Ok(self.default_agent.as_str());
        }

        Err(BusError::new(
            ERR_METHOD_NOT_FOUND,
            format!("default agent '{}' is not enabled", self.default_agent),
        ))
    }

    fn handle_session_detail(&self, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        let BusPayload::SessionQuery { session_id } = payload else {
            let _ = reply_tx.send(Err(BusError::new(
                ERR_METHOD_NOT_FOUND,
                "sessions/detail expects a session query",
            )));
            return;
        };
        let result = self
            .state
            .sessions
            .detail(&session_id)
            .map_err(session_bus_error)
            .and_then(|detail| {
                serde_json::to_string(&detail)
                    .map(|data| BusPayload::JsonResponse { data })
                    .map_err(|e| BusError::new(ERR_INTERNAL, e.to_string()))
            });
        let _ = reply_tx.send(result);
    }
}

impl BusHandler for AgentsSubsystem {
    fn prefix(&self) -> &str {
        "agents"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        if method == "agents/sessions/detail" {
            self.handle_session_detail(payload, reply_tx);
            return;
        }

        // agents[/{agent_id}[/{action}]]
        let mut parts = method.splitn(3, '/');
        let _prefix = parts.next();
        let method_agent_id = parts.next().filter(|s| !s.is_empty());
        let action = parts.next().unwrap_or("").to_string();

        let BusPayload::CommsMessage { channel_id, content, session_id, .. } = payload else {
            let _ = reply_tx.send(Err(BusError::new(
                ERR_METHOD_NOT_FOUND,
                format!("unsupported payload for method: {method}"),
            )));
            return;
        };

        let agent_id = match self.resolve_agent(method_agent_id, &channel_id) {
            Ok(id) => id,
            Err(e) => {
                let _ = reply_tx.send(Err(e));
                return;
            }
        };

        match self.agents.get(agent_id) {
            Some(agent) => {
                agent.handle(action, channel_id, content, session_id, reply_tx, self.state.clone());
            }
            None => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_METHOD_NOT_FOUND,
                    format!("agent not registered: {agent_id}"),
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::bus::SupervisorBus;

    fn subsystem_with(
        default_agent: &str,
        enabled: &[&str],
        channel_map: &[(&str, &str)],
    ) -> AgentsSubsystem {
        let bus = SupervisorBus::new(4);
        AgentsSubsystem::new(
            AgentsConfig {
                default_agent: default_agent.to_string(),
                channel_map: channel_map
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                enabled: enabled.iter().map(|s| s.to_string()).collect(),
                intake_user_name: None,
            },
            bus.handle.clone(),
            PathBuf::from("config/prompts"),
        )
    }

    #[test]
    fn explicit_agent_must_be_enabled() {
        let subsystem = subsystem_with("intake", &["intake"], &[]);
        assert_eq!(subsystem.resolve_agent(Some("intake"), "pty0").unwrap(), "intake");
        assert!(subsystem.resolve_agent(Some("program"), "pty0").is_err());
    }

    #[test]
    fn channel_map_overrides_default() {
        let subsystem = subsystem_with("intake", &["intake", "program"], &[("http0", "program")]);
        assert_eq!(subsystem.resolve_agent(None, "http0").unwrap(), "program");
        assert_eq!(subsystem.resolve_agent(None, "pty0").unwrap(), "intake");
    }

    #[test]
    fn empty_enabled_set_means_no_restrictions() {
        let subsystem = subsystem_with("intake", &[], &[]);
        assert_eq!(subsystem.resolve_agent(None, "pty0").unwrap(), "intake");
    }

    #[test]
    fn disabled_default_agent_is_an_error() {
        let subsystem = subsystem_with("intake", &["program"], &[]);
        assert!(subsystem.resolve_agent(None, "pty0").is_err());
    }
}
