use clap::{Parser, Subcommand};
use concierge::Result;
use concierge::commands::{ingest, run_chat, show_config, show_history};
use concierge::config::get_config_dir;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "concierge")]
#[command(about = "A guest-facing chat assistant grounded in an indexed knowledge base")]
#[command(version)]
struct Cli {
    /// Override the configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a guest chat session in the terminal
    Chat,
    /// Index reference documents into the knowledge base
    Ingest {
        /// Directory containing .txt and .md documents
        dir: PathBuf,
    },
    /// Show the persisted transcript for a guest
    History {
        /// Guest session identifier, e.g. 2608281412-a3f9c1
        guest_id: String,
    },
    /// Show the current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Chat => {
            run_chat(&config_dir).await?;
        }
        Commands::Ingest { dir } => {
            ingest(&config_dir, &dir).await?;
        }
        Commands::History { guest_id } => {
            show_history(&config_dir, &guest_id).await?;
        }
        Commands::Config => {
            show_config(&config_dir)?;
        }
    }

    Ok(())
}
