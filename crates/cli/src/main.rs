//! RelayMind CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Run the Telegram bot
//! - `chat`     — Talk to the relay from the terminal
//! - `history`  — Inspect or clear a user's stored conversation
//! - `config`   — Write the default config file or print its path
//! - `doctor`   — Diagnose configuration and storage

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "relaymind",
    about = "RelayMind — a Telegram relay with per-user conversation memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot (long polling)
    Serve,

    /// Chat with the relay in the terminal
    Chat {
        /// Keep this conversation in memory only
        #[arg(long)]
        ephemeral: bool,

        /// History partition to use
        #[arg(long, default_value_t = 0)]
        user_id: i64,
    },

    /// Inspect or clear stored conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and storage
    Doctor,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print a user's most recent turns, oldest first
    Show {
        #[arg(long)]
        user_id: i64,

        /// Number of turns to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every stored turn of a user
    Clear {
        #[arg(long)]
        user_id: i64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,

    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve => commands::serve::run().await?,
        Commands::Chat { ephemeral, user_id } => commands::chat::run(ephemeral, user_id).await?,
        Commands::History { action } => match action {
            HistoryAction::Show { user_id, limit } => commands::history::show(user_id, limit).await?,
            HistoryAction::Clear { user_id } => commands::history::clear(user_id).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
