use anyhow::{Context, Result, bail};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::EnvFilter;


/// Keeps the non-blocking file writer alive until the import returns.
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn none() -> Self {
        Self { _worker: None }
    }

    pub fn with_guard(guard: WorkerGuard) -> Self {
        Self {
            _worker: Some(guard),
        }
    }
}

/// Maps a configured level name onto a filter. `warning` is accepted for `warn`.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        other => bail!("unknown log level {other:?}"),
    };
    Ok(level)
}

/// Installs the global subscriber.
///
/// With a `file_path` the log goes to that file through a non-blocking writer, otherwise to
/// stderr so stdout stays free for command output. `RUST_LOG` overrides `level`.
pub fn init_logging(file_path: Option<&Path>, level: LevelFilter) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let Some(file_path) = file_path else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(LoggingGuard::none());
    };

    if let Some(parent) = file_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {parent:?}"))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .with_context(|| format!("Failed to open log file {file_path:?}"))?;

    let (writer, guard) = non_blocking::NonBlockingBuilder::default().finish(file);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(LoggingGuard::with_guard(guard))
}
