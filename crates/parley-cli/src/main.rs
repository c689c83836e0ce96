use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use parley_infrastructure::{ConfigService, ParleyPaths};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI - developer tools for the streaming session engine", long_about = None)]
struct Cli {
    /// Use this directory instead of the platform config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one exchange against a recorded event stream
    Replay {
        /// JSON-lines file with one stream event per line
        script: PathBuf,
        /// Workspace the exchange runs in
        #[arg(long, default_value = "default")]
        workspace: String,
        /// Text of the user message
        #[arg(long)]
        message: String,
        /// Print the assembled message as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which stored session would be restored for a workspace
    Resolve {
        #[arg(long)]
        workspace: String,
        /// Topic id, most recent first (repeatable)
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = ParleyPaths::new(cli.config_dir);
    let config = ConfigService::new(&paths)?.get_config()?;
    let _log_guard = logging::init(&config.logging, &paths)?;

    match cli.command {
        Commands::Replay {
            script,
            workspace,
            message,
            json,
        } => commands::replay::run(&config.engine, &script, &workspace, &message, json).await?,
        Commands::Resolve { workspace, topics } => {
            commands::resolve::run(&paths, &workspace, &topics).await?
        }
    }

    Ok(())
}
