//! MebelPlace realtime CLI.
//!
//! Operator tool for the marketplace WebSocket channels: tail a channel,
//! push a single event, check connectivity, and manage the local config.

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mp_channels::Channel;
use mp_core::config::{AppConfig, ConfigHandle};
use mp_core::constants;
use mp_core::error::MpResult;
use mp_core::logging;

/// MebelPlace realtime channels client.
#[derive(Parser)]
#[command(
    name = "mebelplace-ws",
    version,
    about = "MebelPlace realtime channels CLI",
    long_about = "A command-line client for the MebelPlace WebSocket channels.\n\
                  Listen to chats, requests and notifications, or emit client events by hand."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a channel and print every event until Ctrl+C.
    Listen {
        /// Channel to listen on (chats, requests, notifications).
        channel: Channel,
        /// Join this chat room (chats channel only).
        #[arg(long)]
        chat_id: Option<i64>,
        /// Only print these events (repeatable).
        #[arg(short, long = "event")]
        events: Vec<String>,
        /// Subscribe to updates for this request (requests channel only).
        #[arg(long)]
        request_id: Option<i64>,
    },
    /// Connect, send one event, and disconnect.
    Emit {
        /// Channel to send on.
        channel: Channel,
        /// Event name, e.g. join_chat.
        event: String,
        /// JSON payload. Defaults to null.
        data: Option<String>,
        /// Seconds to wait for the connection to open.
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Check whether each channel can be reached.
    Status {
        /// Seconds to wait per channel.
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
    /// View and modify the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// The config file as saved on disk, plus the runtime copy with
/// environment overrides applied. Only the former is ever written back.
fn load_configs(path: &Path) -> MpResult<(AppConfig, AppConfig)> {
    let file = if path.exists() {
        AppConfig::load_from_file(path)?
    } else {
        AppConfig::default()
    };
    let mut runtime = file.clone();
    runtime.apply_env_overrides();
    Ok((file, runtime))
}

#[tokio::main]
async fn main() -> MpResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let (file_config, config) = load_configs(&config_path)?;

    // Initialize logging, falling back to stderr only when the log
    // directory is unusable.
    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let _guard = match config
        .effective_log_dir()
        .and_then(|dir| logging::init_logging(log_level, &dir, config.logging.json_output))
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console_logging(log_level);
            warn!("file logging disabled: {e}");
            None
        }
    };

    info!("{} CLI v{}", constants::APP_NAME, constants::APP_VERSION);

    match cli.command {
        Commands::Listen {
            channel,
            chat_id,
            events,
            request_id,
        } => {
            let config_handle = ConfigHandle::new(config);
            commands::listen::run(config_handle, channel, chat_id, request_id, events, cli.format)
                .await
        }
        Commands::Emit {
            channel,
            event,
            data,
            timeout,
        } => {
            let config_handle = ConfigHandle::new(config);
            commands::emit::run(config_handle, channel, event, data, timeout, cli.format).await
        }
        Commands::Status { timeout } => {
            commands::status::run(ConfigHandle::new(config), timeout, cli.format).await
        }
        Commands::Config { action } => {
            let config_handle = ConfigHandle::new(file_config);
            commands::config::run(config_handle, &config_path, action, cli.format).await
        }
    }
}
