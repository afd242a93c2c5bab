//! Portier CLI - log in and work with the user service from a terminal

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "portier")]
#[command(about = "Log in to Portier and manage the current session")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Directory holding the cookie jar (defaults to the platform data dir)
    #[arg(short = 'd', long, global = true, env = "PORTIER_STATE_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file with `user_api` and `credential_api`
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(cli.log_level.into())?;

    let paths = config::Paths::resolve(cli.data_dir, cli.config);
    let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));
    info!(data_dir = %paths.data_dir.display(), "Starting Portier CLI");

    match cli.command.execute(&paths, timeout).await {
        Ok(()) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
