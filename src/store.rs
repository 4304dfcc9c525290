use crate::error::ImportResult;
use crate::record::{METRIC_NAMES, Metrics};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod file;
pub mod memory;


pub use file::FileStore;
pub use memory::MemoryStore;

/// Identifies one series: `(source, port)`, with `""` meaning all sources and 0 no port filter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub source: String,
    pub port: u16,
}

impl SeriesKey {
    pub fn new(source: impl Into<String>, port: u16) -> Self {
        Self {
            source: source.into(),
            port,
        }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self::new(source, 0)
    }

    pub fn combined(port: u16) -> Self {
        Self::new("", port)
    }

    pub fn is_combined(&self) -> bool {
        self.source.is_empty()
    }

    pub fn file_stem(&self) -> String {
        match (self.source.is_empty(), self.port) {
            (true, 0) => "all".to_string(),
            (true, port) => port.to_string(),
            (false, 0) => self.source.clone(),
            (false, port) => format!("{}_{}", self.source, port),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.source.is_empty() { "*" } else { &self.source };
        if self.port == 0 {
            write!(f, "{}", source)
        } else {
            write!(f, "{}:{}", source, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSchema {
    pub step_seconds: u64,
    pub metrics: Vec<String>,
}

impl SeriesSchema {
    pub fn with_step(step_seconds: u64) -> Self {
        Self {
            step_seconds,
            metrics: METRIC_NAMES.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Explains the first difference between `self` (expected) and `actual`.
    pub fn diff(&self, actual: &SeriesSchema) -> Option<String> {
        if self.step_seconds != actual.step_seconds {
            return Some(format!(
                "step is {}s, expected {}s",
                actual.step_seconds, self.step_seconds
            ));
        }
        if self.metrics.len() != actual.metrics.len() {
            return Some(format!(
                "{} metrics, expected {}",
                actual.metrics.len(),
                self.metrics.len()
            ));
        }
        self.metrics
            .iter()
            .zip(&actual.metrics)
            .position(|(a, b)| a != b)
            .map(|i| {
                format!(
                    "metric #{} is `{}`, expected `{}`",
                    i, actual.metrics[i], self.metrics[i]
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureReport {
    pub valid: bool,
    pub message: String,
}

impl StructureReport {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }

    pub fn compare(expected: &SeriesSchema, actual: &SeriesSchema) -> Self {
        match expected.diff(actual) {
            Some(message) => Self::invalid(message),
            None => Self::valid("structure matches"),
        }
    }
}

/// Append-only time-series storage keyed by [`SeriesKey`].
///
/// Implementations must refuse an `append` whose timestamp is not newer than the
/// series' last sample, independently of any checks done by callers.
pub trait SeriesStore {
    /// Timestamp of the newest sample, `None` when the series is missing or empty.
    fn last_update(&self, key: &SeriesKey) -> ImportResult<Option<i64>>;

    fn exists(&self, key: &SeriesKey) -> ImportResult<bool>;

    /// Creates the series if absent. Returns whether it was created.
    fn create(&mut self, key: &SeriesKey, schema: &SeriesSchema) -> ImportResult<bool>;

    fn append(&mut self, key: &SeriesKey, timestamp: i64, metrics: &Metrics) -> ImportResult<()>;

    fn validate_structure(
        &self,
        key: &SeriesKey,
        expected: &SeriesSchema,
    ) -> ImportResult<StructureReport>;

    /// Removes every series. Returns how many were removed.
    fn reset(&mut self) -> ImportResult<usize>;

    /// Keys of every stored series, sorted.
    fn list(&self) -> ImportResult<Vec<SeriesKey>>;
}
