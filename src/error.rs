use crate::store::SeriesKey;
use std::path::PathBuf;
use thiserror::Error;

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not extract timestamp from filename: {0}")]
    MalformedFilename(String),
    #[error("`{command}` failed: {reason}")]
    ToolInvocation { command: String, reason: String },
    #[error("stale write to {key}: timestamp {timestamp} is not newer than {last}")]
    StaleWrite {
        key: SeriesKey,
        timestamp: i64,
        last: i64,
    },
    #[error("time-series store unreachable at {path:?}: {source}")]
    StoreUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read nfdump profile directory {0:?}")]
    MissingProfileRoot(PathBuf),
    #[error("series {key} does not match the expected structure: {message}")]
    SchemaMismatch { key: SeriesKey, message: String },
    #[error("series {0} does not exist")]
    MissingSeries(SeriesKey),
    #[error("corrupt series {key}: {message}")]
    CorruptSeries { key: SeriesKey, message: String },
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    pub fn tool(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolInvocation {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort the whole run; everything else is handled per file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreUnreachable { .. } | Self::MissingProfileRoot(_) | Self::SchemaMismatch { .. }
        )
    }
}

/// Result of an operation that may legitimately decline to do any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    NotUpdatable,
}

impl Outcome {
    pub fn is_written(self) -> bool {
        self == Outcome::Written
    }
}
