//! Log output setup
//!
//! Console output (stderr by default, plain or JSON, optionally coloured) and
//! a JSON log file rotated by size. Both are optional and can run together.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

const MEGABYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Level for this crate when `RUST_LOG` is unset
    pub level: String,
    pub console: bool,
    /// Console to stdout instead of stderr
    pub stdout: bool,
    pub json: bool,
    pub color: bool,
    /// JSON log file; none disables file logging
    pub file: Option<PathBuf>,
    /// Rotated files to keep
    pub backups: usize,
    /// Rotate once the file reaches this many megabytes
    pub size_mb: u64,
    /// Remove rotated files older than this many days; `0` keeps them
    pub age_days: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            stdout: false,
            json: false,
            color: true,
            file: None,
            backups: 3,
            size_mb: 5,
            age_days: 7,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log level '{level}': {source}")]
    Level {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("Unable to open log file '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to install logger: {0}")]
    Init(#[from] TryInitError),
}

/// Flushes the log file when dropped; hold it for the life of the process
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type Filtered = tracing_subscriber::layer::Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Install the global subscriber
pub fn init(options: &LogOptions) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("upwatch={}", options.level)).map_err(|source| {
            LoggingError::Level {
                level: options.level.clone(),
                source,
            }
        })?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if options.console {
        layers.push(console_layer(options));
    }

    let mut guard = None;
    if let Some(path) = &options.file {
        if options.age_days > 0 {
            let age = Duration::from_secs(options.age_days * 24 * 60 * 60);
            // Nothing is logging yet, so a failure here can't be reported
            let _ = prune_backups(path, age);
        }
        let appender = file_appender(path, options.backups, options.size_mb * MEGABYTE)?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;

    Ok(LogGuard { _file: guard })
}

fn console_layer(options: &LogOptions) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer().with_ansi(options.color && !options.json);
    match (options.json, options.stdout) {
        (true, true) => layer.json().with_writer(io::stdout).boxed(),
        (true, false) => layer.json().with_writer(io::stderr).boxed(),
        (false, true) => layer.with_writer(io::stdout).boxed(),
        (false, false) => layer.with_writer(io::stderr).boxed(),
    }
}

/// Open `path` for appending, rotating to `path.1` .. `path.<backups>` once
/// it grows past `max_bytes`. Missing parent directories are created.
pub fn file_appender(
    path: &Path,
    backups: usize,
    max_bytes: u64,
) -> Result<BasicRollingFileAppender, LoggingError> {
    let failed = |source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(failed)?;
    }

    let condition = RollingConditionBasic::new().max_size(max_bytes.max(1));
    BasicRollingFileAppender::new(path, condition, backups.max(1)).map_err(failed)
}

/// Delete rotated copies of `path` last modified more than `age` ago.
/// Returns how many were removed.
pub fn prune_backups(path: &Path, age: Duration) -> io::Result<usize> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !dir.exists() {
        return Ok(0);
    }

    let prefix = format!("{}.", name);
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let is_backup = file_name
            .to_str()
            .and_then(|f| f.strip_prefix(&prefix))
            .map_or(false, |n| n.parse::<u32>().is_ok());
        if !is_backup {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > age {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}
