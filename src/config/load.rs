//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `FITBOT_WORK_DIR` and `FITBOT_LOG_LEVEL` env overrides.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Deep-merge two TOML values.
/// Tables are merged recursively — the overlay only needs to specify keys
/// that differ from the base. For every other type (string, integer,
/// array, …) the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return
/// the fully merged `toml::Value`. `visited` carries canonicalized paths
/// already seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. If no path is given and `config/default.toml` does
/// not exist, returns a hardcoded minimal default.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("FITBOT_WORK_DIR").ok();
    let log_level_override = env::var("FITBOT_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        return load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    } else {
        // Hardcoded minimal default
        let work_dir_str = work_dir_override.unwrap_or_else(|| "~/.fitbot".to_string());
        let work_dir = expand_home(&work_dir_str);
        let log_level = log_level_override.unwrap_or_else(|| "info".to_string());

        Ok(Config {
            bot_name: "fitbot".to_string(),
            work_dir,
            log_level,
            prompts_dir: PathBuf::from("config/prompts"),
            comms: CommsConfig {
                pty: PtyConfig { enabled: true },
                axum_channel: AxumChannelConfig {
                    enabled: false,
                    bind: "127.0.0.1:8080".to_string(),
                },
            },
            agents: AgentsConfig {
                default_agent: "intake".to_string(),
                channel_map: HashMap::new(),
                enabled: HashSet::from(["intake".to_string(), "program".to_string()]),
                intake_user_name: None,
            },
            llm: LlmConfig {
                provider: "dummy".to_string(),
                gemini: GeminiConfig {
                    api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                    model: "gemini-2.0-flash-001".to_string(),
                    temperature: 0.4,
                    top_p: 0.9,
                    response_mime_type: None,
                    timeout_seconds: 60,
                },
            },
            users: UsersConfig { db_file: "users.db".to_string() },
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
        })
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val)
        .map_err(|e: toml::de::Error| {
            AppError::Config(format!("config error in {}: {e}", path.display()))
        })?;

    let s = parsed.supervisor;

    let work_dir_str = work_dir_override.unwrap_or(&s.work_dir).to_string();
    let work_dir = expand_home(&work_dir_str);
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();

    let mut enabled = HashSet::new();
    if parsed.agents.intake.enabled {
        enabled.insert("intake".to_string());
    }
    if parsed.agents.program.enabled {
        enabled.insert("program".to_string());
    }

    Ok(Config {
        bot_name: s.bot_name,
        work_dir,
        log_level,
        prompts_dir: PathBuf::from(s.prompts_dir),
        comms: CommsConfig {
            pty: PtyConfig {
                enabled: parsed.comms.pty.enabled,
            },
            axum_channel: AxumChannelConfig {
                enabled: parsed.comms.axum_channel.enabled,
                bind: parsed.comms.axum_channel.bind,
            },
        },
        agents: AgentsConfig {
            default_agent: parsed.agents.default_agent,
            channel_map: parsed.agents.routing,
            enabled,
            intake_user_name: parsed.agents.intake.user_name,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: GeminiConfig {
                api_base_url: parsed.llm.gemini.api_base_url,
                model: parsed.llm.gemini.model,
                temperature: parsed.llm.gemini.temperature,
                top_p: parsed.llm.gemini.top_p,
                response_mime_type: parsed.llm.gemini.response_mime_type,
                timeout_seconds: parsed.llm.gemini.timeout_seconds,
            },
        },
        users: UsersConfig {
            db_file: parsed.users.db_file,
        },
        gemini_api_key: env::var("GEMINI_API_KEY").ok(),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[supervisor]
bot_name = "fitbot-test"
work_dir = "/tmp/fitbot-test"
log_level = "debug"
"#;

    #[test]
    fn minimal_config_resolves_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "min.toml", MINIMAL);

        let config = load_from(&path, None, None).unwrap();
        assert_eq!(config.bot_name, "fitbot-test");
        assert_eq!(config.log_level, "debug");
        assert!(config.comms.pty.enabled);
        assert!(!config.comms.axum_channel.enabled);
        assert_eq!(config.agents.default_agent, "intake");
        assert!(config.agents.enabled.contains("intake"));
        assert!(config.agents.enabled.contains("program"));
        assert_eq!(config.llm.provider, "dummy");
        assert_eq!(config.llm.gemini.model, "gemini-2.0-flash-001");
        assert_eq!(config.users.db_file, "users.db");
    }

    #[test]
    fn overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "min.toml", MINIMAL);

        let config = load_from(&path, Some("/data/fitbot"), Some("trace")).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/data/fitbot"));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn base_inheritance_merges_key_by_key() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "base.toml",
            r#"
[supervisor]
bot_name = "base-bot"
work_dir = "/tmp/base"
log_level = "info"

[llm]
provider = "gemini"

[llm.gemini]
model = "gemini-2.0-flash-001"
temperature = 0.7
"#,
        );
        let overlay = write_config(
            dir.path(),
            "overlay.toml",
            r#"
[meta]
base = "base.toml"

[supervisor]
bot_name = "overlay-bot"
work_dir = "/tmp/base"
log_level = "info"

[llm.gemini]
temperature = 0.2
"#,
        );

        let config = load_from(&overlay, None, None).unwrap();
        assert_eq!(config.bot_name, "overlay-bot");
        // Overlay wins where set, base fills the rest.
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.gemini.temperature, 0.2);
        assert_eq!(config.llm.gemini.model, "gemini-2.0-flash-001");
    }

    #[test]
    fn circular_base_detected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "a.toml", "[meta]\nbase = \"b.toml\"\n");
        let a = dir.path().join("a.toml");
        write_config(dir.path(), "b.toml", "[meta]\nbase = \"a.toml\"\n");

        let err = load_from(&a, None, None).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn disabled_agent_excluded_from_enabled_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "min.toml",
            r#"
[supervisor]
bot_name = "t"
work_dir = "/tmp/t"
log_level = "info"

[agents.program]
enabled = false
"#,
        );

        let config = load_from(&path, None, None).unwrap();
        assert!(config.agents.enabled.contains("intake"));
        assert!(!config.agents.enabled.contains("program"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
    }
}
