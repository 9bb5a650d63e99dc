//! Hearth CLI
//!
//! Command-line entry point: workspace scaffolding (`init`), the long-running
//! trigger-bridge process (`serve`), and version reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use hearth::anticipation::{HttpStateWatcher, WakeBridge};
use hearth::bridges::{ChatBridge, ChatContext, PollingStateChangeStream, ScheduleBridge, StateBridge, TelegramTransport};
use hearth::config::{load_config, load_config_from_path, Config};
use hearth::runtime::Runtime;
use hearth::{Error, Result, VERSION};

const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../assets/config.default.yaml");
const DEFAULT_PERSONA: &str = include_str!("../../assets/persona.md");
const TALENT_HOME: &str = include_str!("../../assets/talents/home.md");
const TALENT_CALENDAR: &str = include_str!("../../assets/talents/calendar.md");

#[derive(Parser)]
#[command(
    name = "hearth",
    author,
    version = VERSION,
    about = "Hearth - an autonomous household assistant",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat, state, and schedule trigger bridges until interrupted.
    Serve {
        /// Path to a config file; defaults to the platform config directory.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Populate a workspace directory with default config, persona, and talents.
    Init {
        /// Target directory; defaults to the platform config directory.
        dir: Option<PathBuf>,
    },
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("hearth=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config).await,
        Commands::Init { dir } => init_workspace(dir),
        Commands::Version => {
            println!("hearth {}", VERSION);
            Ok(())
        }
    }
}

fn init_workspace(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(hearth::config::config_dir);
    println!("{} workspace at {}", style("Initializing").green().bold(), dir.display());

    std::fs::create_dir_all(dir.join("db"))?;
    std::fs::create_dir_all(dir.join("talents"))?;

    let db_path = dir.join("db").join("hearth.db");
    let config_content = DEFAULT_CONFIG_TEMPLATE
        .replace("./workspace", &dir.to_string_lossy())
        .replace("./db/hearth.db", &db_path.to_string_lossy());

    write_new_file(&dir.join("config.yaml"), &config_content, 0o600)?;
    write_new_file(&dir.join("persona.md"), DEFAULT_PERSONA, 0o644)?;
    write_new_file(&dir.join("talents").join("home.md"), TALENT_HOME, 0o644)?;
    write_new_file(&dir.join("talents").join("calendar.md"), TALENT_CALENDAR, 0o644)?;

    println!("{}", style("Workspace ready.").green());
    Ok(())
}

/// Write a file only if it doesn't already exist, then set its permission
/// bits (spec §6 "init ... never overwrite existing files").
fn write_new_file(path: &Path, content: &str, mode: u32) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(content.as_bytes())?;
            file.set_permissions(std::fs::Permissions::from_mode(mode))?;
            println!("  created {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            println!("  {} exists, skipping", path.display());
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config: Config = match config_path {
        Some(path) => load_config_from_path(&path)?,
        None => load_config()?,
    };

    let runtime = Arc::new(Runtime::bootstrap(config).await?);
    println!("{}", style("Hearth is awake.").green().bold());

    let mut handles = Vec::new();
    let mut chat_bridge_for_sweep = None;

    if let Some(telegram) = runtime.config.channels.telegram.clone() {
        use secrecy::ExposeSecret;
        let transport = Arc::new(TelegramTransport::new(
            telegram.bot_token.expose_secret(),
            telegram.allow_from.clone(),
        ));
        let chat_bridge = Arc::new(
            ChatBridge::new(
                transport,
                telegram.rate_limit_per_minute,
                telegram.reply_tool_name.clone(),
                runtime.llm_client.clone(),
                runtime.router.clone(),
                runtime.tools.clone(),
                "telegram",
            )
            .with_conversation_store(runtime.conversations.clone())
            .with_context(ChatContext {
                persona: (*runtime.persona).clone(),
                capability_tags: (*runtime.capability_tags).clone(),
                talents_dir: runtime.talents_dir.clone(),
                channel_pins: telegram.pinned_tags.clone(),
                history_limit: 20,
                iteration_gated_tools: runtime.config.agent.iteration_gated_tools.clone(),
            }),
        );
        chat_bridge_for_sweep = Some(chat_bridge.clone());
        let bridge = chat_bridge.clone();
        handles.push(tokio::spawn(async move { bridge.run_forever().await }));
    } else {
        tracing::warn!("channels.telegram not configured; chat bridge disabled");
    }

    if let Some(smart_home) = runtime.config.channels.smart_home.clone() {
        let watcher = Arc::new(HttpStateWatcher::new(smart_home.base_url.clone(), smart_home.token.clone()));
        let wake_bridge = Arc::new(WakeBridge::new(
            watcher.clone(),
            (*runtime.anticipations).clone(),
            runtime.config.anticipation.clone(),
            runtime.llm_client.clone(),
            runtime.router.clone(),
            runtime.tools.clone(),
        ));
        let stream = Arc::new(PollingStateChangeStream::new(
            watcher,
            smart_home.watched_entities.clone(),
            Duration::from_secs(smart_home.poll_interval_secs),
        ));
        let state_bridge = Arc::new(StateBridge::new(stream, wake_bridge));
        handles.push(tokio::spawn(async move { state_bridge.run_forever().await }));
    } else {
        tracing::warn!("channels.smart_home not configured; state bridge disabled");
    }

    let schedule_bridge = Arc::new(
        ScheduleBridge::new(
            (*runtime.scheduled_tasks).clone(),
            runtime.llm_client.clone(),
            runtime.router.clone(),
            runtime.tools.clone(),
            hearth::agent::EgoNotes::new(runtime.talents_dir.join("..").join("ego.md")),
        )
        .with_gated_tools(runtime.config.agent.iteration_gated_tools.clone()),
    );
    {
        let bridge = schedule_bridge.clone();
        handles.push(tokio::spawn(async move { bridge.run_forever().await }));
    }

    handles.push(tokio::spawn(sweep_rate_limiters(chat_bridge_for_sweep)));

    tokio::signal::ctrl_c().await.map_err(|e| Error::Internal(e.to_string()))?;
    println!("{}", style("Shutting down.").yellow());
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

/// Periodic rate-limiter eviction sweep (spec §5 "a periodic sweep every 10
/// min evicts entries older than two windows").
async fn sweep_rate_limiters(chat_bridge: Option<Arc<ChatBridge<TelegramTransport>>>) {
    loop {
        tokio::time::sleep(Duration::from_secs(600)).await;
        if let Some(bridge) = &chat_bridge {
            bridge.sweep_rate_limiter();
        }
        tracing::debug!("rate-limiter sweep tick");
    }
}
