use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wilayah::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "wilayah",
    version,
    about = "Resumable crawler and lookup API for the Indonesian region hierarchy",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the lookup API and crawl control endpoints
    Serve {
        /// Bind address, overrides the configured one
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Crawl the full region tree in the foreground, resuming today's checkpoint
    Crawl {
        /// Regency workers per province (1-8)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=8))]
        workers: Option<u8>,
    },

    /// Inspect or prune checkpoint files
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Re-normalise names in an existing dataset file
    Fix {
        /// Dataset to repair
        input: PathBuf,

        /// Output file; when omitted the input is backed up and rewritten
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List checkpoints with size and node counts
    Info,

    /// Delete checkpoints older than the given number of days
    Clean {
        #[arg(short, long, default_value = "7")]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.logging.format)
        .to_string();
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("wilayah starting");

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting serve command");
            commands::serve(config, bind).await?;
        }

        Commands::Crawl { workers } => {
            let workers = workers.map_or(config.crawler.max_workers, usize::from);
            tracing::info!(workers, year = config.crawler.year, "Starting crawl command");
            commands::crawl(config, workers).await?;
        }

        Commands::Checkpoints { action } => match action {
            CheckpointAction::Info => commands::checkpoints_info(&config)?,
            CheckpointAction::Clean { days } => {
                tracing::info!(days, "Cleaning checkpoints");
                commands::checkpoints_clean(&config, days)?;
            }
        },

        Commands::Fix { input, output } => {
            tracing::info!(input = %input.display(), output = ?output, "Starting fix command");
            commands::fix(input, output)?;
        }
    }

    tracing::info!("wilayah completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => tracing_subscriber::EnvFilter::new("wilayah=debug,info"),
        Err(_) => tracing_subscriber::EnvFilter::try_new(format!("wilayah={level},warn"))
            .context("Invalid log level")?,
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
