//! Upwatch
//!
//! Run with: upwatch --config upwatch.yaml
//!
//! Environment variables:
//! - UPWATCH_CONFIG: Config file path (required unless --config is given)
//! - UPWATCH_LOG_LEVEL: Log level when RUST_LOG is unset (default: info)
//! - UPWATCH_LOG_CONSOLE, UPWATCH_LOG_STDOUT, UPWATCH_LOG_JSON,
//!   UPWATCH_LOG_COLOR: Console output switches
//! - UPWATCH_LOG_FILE, UPWATCH_LOG_BACKUPS, UPWATCH_LOG_SIZE, UPWATCH_LOG_AGE:
//!   JSON log file and its rotation
//! - UPWATCH_*: Available to request body templates with the prefix stripped
//!
//! Signals: SIGINT/SIGTERM stop the process, SIGHUP/SIGUSR1 reload the config.
//! A reload that fails validation keeps the running configuration.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use upwatch::config::Config;
use upwatch::logging::{self, LogOptions};
use upwatch::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "upwatch", version, about = "Uptime monitor with webhook alerts")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "UPWATCH_CONFIG")]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "UPWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log to the console
    #[arg(long, env = "UPWATCH_LOG_CONSOLE", action = ArgAction::Set, default_value_t = true)]
    log_console: bool,

    /// Console logs go to stdout instead of stderr
    #[arg(long, env = "UPWATCH_LOG_STDOUT")]
    log_stdout: bool,

    /// Console logs as JSON lines
    #[arg(long, env = "UPWATCH_LOG_JSON")]
    log_json: bool,

    /// Colour console logs; ignored for JSON
    #[arg(long, env = "UPWATCH_LOG_COLOR", action = ArgAction::Set, default_value_t = true)]
    log_color: bool,

    /// Also log JSON lines to this file
    #[arg(long, env = "UPWATCH_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Rotated log files to keep
    #[arg(long, env = "UPWATCH_LOG_BACKUPS", default_value_t = 3)]
    log_backups: usize,

    /// Rotate the log file at this size, in megabytes
    #[arg(long, env = "UPWATCH_LOG_SIZE", default_value_t = 5)]
    log_size: u64,

    /// Remove rotated log files older than this many days, 0 to keep them
    #[arg(long, env = "UPWATCH_LOG_AGE", default_value_t = 7)]
    log_age: u64,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.log_level.clone(),
            console: self.log_console,
            stdout: self.log_stdout,
            json: self.log_json,
            color: self.log_color,
            file: self.log_file.clone(),
            backups: self.log_backups,
            size_mb: self.log_size,
            age_days: self.log_age,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _log = logging::init(&cli.log_options())?;

    let config = Config::load(&cli.config)?;
    if cli.check {
        tracing::info!(
            path = %cli.config.display(),
            jobs = config.schedule.len(),
            alerters = config.alerters.len(),
            "Config is valid"
        );
        return Ok(());
    }

    let supervisor = Supervisor::start(config);
    let supervisor = serve(&cli.config, supervisor).await?;
    supervisor.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Handle signals until asked to stop, returning the supervisor to shut down
#[cfg(unix)]
async fn serve(
    path: &Path,
    mut supervisor: Supervisor,
) -> Result<Supervisor, Box<dyn std::error::Error>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("Received SIGHUP");
                supervisor = supervisor.reload(path).await;
            }
            _ = user1.recv() => {
                tracing::info!("Received SIGUSR1");
                supervisor = supervisor.reload(path).await;
            }
        }
    }

    Ok(supervisor)
}

#[cfg(not(unix))]
async fn serve(
    _path: &Path,
    supervisor: Supervisor,
) -> Result<Supervisor, Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C");
    Ok(supervisor)
}
