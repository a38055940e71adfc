use anyhow::Result;
use clap::{Parser, Subcommand};

use paperpress_bot::channels;
use paperpress_bot::config::Config;

/// PaperPress - merge photos into PDFs and compress files, over Telegram.
#[derive(Parser, Debug)]
#[command(name = "paperpress-bot")]
#[command(version = "0.1.0")]
#[command(about = "Telegram bot for image-to-PDF conversion and file compression", long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: ~/.paperpress/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot (the default when no subcommand is given)
    Run,
    /// Check the bot token and the PDF compression tool
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Fail fast: a missing bot token should never surface mid-session.
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => channels::start(config).await,
        Commands::Doctor => channels::doctor(config).await,
    }
}
