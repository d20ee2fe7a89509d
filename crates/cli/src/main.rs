//! ragrelay CLI, the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP chat gateway
//! - `config`   Show, locate or validate the configuration
//! - `history`  Inspect or forget a stored conversation

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "ragrelay",
    about = "ragrelay: retrieval-augmented chat relay",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
    /// Load and validate the configuration
    Validate,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the stored items of a conversation
    Show {
        /// Conversation id
        cid: String,
    },
    /// Delete a conversation
    Clear {
        /// Conversation id
        cid: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
        Commands::History { action } => match action {
            HistoryAction::Show { cid } => commands::history::show(&cid).await?,
            HistoryAction::Clear { cid } => commands::history::clear(&cid).await?,
        },
    }

    Ok(())
}
