//! Fitbot — supervisor entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the supervisor bus and subsystem handlers
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Spawn supervisor run-loop
//!   8. Run comms channels (drives the console until shutdown)
//!   9. Cancel token + join supervisor

use tokio_util::sync::CancellationToken;
use tracing::info;

use fitbot::config;
use fitbot::error::AppError;
use fitbot::logger;
use fitbot::subsystems::agents::AgentsSubsystem;
use fitbot::subsystems::comms;
use fitbot::subsystems::llm::LlmSubsystem;
use fitbot::subsystems::users::UsersSubsystem;
use fitbot::supervisor::{self, bus::SupervisorBus, dispatch::BusHandler};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // Without -i, the console channel stays off (daemon-safe default).
    if !args.interactive {
        config.comms.pty.enabled = false;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    // The user store lives under work_dir; make sure it exists.
    std::fs::create_dir_all(&config.work_dir)?;

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();

    // Build the supervisor bus (buffer = 64 messages).
    let bus = SupervisorBus::new(64);
    // Clone the handle before moving the bus into the supervisor task.
    let bus_handle = bus.handle.clone();

    // Ctrl-C handler — cancels the token so all tasks shut down.
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    // Build subsystem handlers and register with the supervisor.
    let mut handlers: Vec<Box<dyn BusHandler>> = vec![];
    let mut configured_handlers: Vec<String> = vec![];

    let llm = LlmSubsystem::new(&config.llm, config.gemini_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    handlers.push(Box::new(llm));
    configured_handlers.push("llm".to_string());

    let agents = AgentsSubsystem::new(
        config.agents.clone(),
        bus_handle.clone(),
        config.prompts_dir.clone(),
    );
    handlers.push(Box::new(agents));
    configured_handlers.push("agents".to_string());

    let users = UsersSubsystem::new(&config.users_db_path())?;
    handlers.push(Box::new(users));
    configured_handlers.push("users".to_string());

    // Spawn supervisor run-loop (owns the bus receiver).
    let sup_token = shutdown.clone();
    let sup_handle = tokio::spawn(async move {
        supervisor::run(bus, sup_token, handlers).await;
    });

    print_startup_summary(&config, args.interactive, &configured_handlers);

    // Start comms channels as independent concurrent tasks.
    let comms = comms::start(&config, bus_handle, shutdown.clone());
    comms.join().await?;

    // If comms exited due to EOF (not Ctrl-C), still signal everything to stop.
    shutdown.cancel();

    sup_handle.await.ok();

    // In interactive mode, print a clean exit line so the shell prompt
    // appears below the tracing output. In daemon mode, exit silently.
    if args.interactive {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

fn print_startup_summary(config: &config::Config, interactive: bool, configured_handlers: &[String]) {
    let pid = std::process::id();
    let mode_text = if interactive { "interactive" } else { "daemon" };

    let fit = |text: String| -> String {
        const WIDTH: usize = 52;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let llm_line = format!(
        "provider={} model={} temp={} timeout={}s",
        config.llm.provider,
        config.llm.gemini.model,
        config.llm.gemini.temperature,
        config.llm.gemini.timeout_seconds
    );

    let mut comms_lines = Vec::new();
    let pty_status = if config.comms.pty.enabled { "enabled" } else { "disabled" };
    comms_lines.push(format!("⌨️  pty: {pty_status}"));
    if config.comms.axum_channel.enabled {
        comms_lines.push(format!("🌐 http: {}", config.comms.axum_channel.bind));
    } else {
        comms_lines.push("🌐 http: disabled".to_string());
    }

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║ 🏋️  Fitbot Supervisor Status                           ║");
    println!("╟────────────────────────────────────────────────────────╢");
    println!("║ 🧾 Bot: {:<47}║", config.bot_name);
    println!("║ 🧠 PID: {:<47}║", pid);
    println!("║ 🛰️  Mode: {:<46}║", mode_text);
    println!("╟────────────────────────────────────────────────────────╢");
    println!("║ ⚙️  Subsystems                                         ║");
    println!("║   {}║", fit(format!("✅ {}", configured_handlers.join(", "))));
    println!("╟────────────────────────────────────────────────────────╢");
    println!("║ 📡 Comms                                               ║");
    for line in comms_lines {
        println!("║   {}║", fit(line));
    }
    println!("╟────────────────────────────────────────────────────────╢");
    println!("║ 🧠 LLM                                                 ║");
    println!("║   {}║", fit(llm_line));
    println!("╚════════════════════════════════════════════════════════╝");

    if interactive {
        println!("💡 Type /help for help");
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: fitbot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run in interactive mode (enables the console channel)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}
