mod cli;

use std::path::PathBuf;

use aiary::config::AiaryConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiary", version, about = "Parenting diary captions and daily narratives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a day's narrative diary with the local model
    Generate {
        /// JSON array of {"text", "taken_at", "photo"} caption records
        captions: PathBuf,
        /// Day to aggregate (YYYY-MM-DD). Defaults to the day of the earliest caption.
        #[arg(long)]
        date: Option<String>,
        /// Owner label carried in logs
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// Write a one-line caption for a photo via the external service
    Caption {
        image: PathBuf,
        /// Override the default caption instruction
        #[arg(long)]
        instruction: Option<String>,
    },
    /// Write a free-form daily summary via the external service
    Summarize {
        captions: PathBuf,
        #[arg(long)]
        date: String,
    },
    /// Check model artifacts, device, and credentials
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The API key may live in .env next to the binary's working directory.
    let _ = dotenvy::dotenv();

    let config = AiaryConfig::load()?;

    // Log to stderr so stdout carries only command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Generate {
            captions,
            date,
            owner,
        } => {
            cli::generate::generate(&config, &captions, date.as_deref(), &owner).await?;
        }
        Command::Caption { image, instruction } => {
            cli::caption::caption(&config, &image, instruction.as_deref()).await?;
        }
        Command::Summarize { captions, date } => {
            cli::caption::summarize(&config, &captions, &date).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
