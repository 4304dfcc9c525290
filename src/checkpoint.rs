use crate::capture::parse_capture_name;
use crate::error::ImportResult;
use crate::pipeline::Pipeline;
use crate::store::{SeriesKey, SeriesStore};
use crate::tool::FlowTool;
use std::path::Path;
use tracing::trace;


/// True when a file at `timestamp` may still be appended after `checkpoint`.
pub fn is_after_checkpoint(timestamp: i64, checkpoint: Option<i64>) -> bool {
    checkpoint.is_none_or(|last| timestamp > last)
}

impl<T: FlowTool, S: SeriesStore> Pipeline<T, S> {
    /// Newest sample timestamp of `(source, port)`. Never creates the series.
    pub fn last_update(&self, source: &str, port: u16) -> ImportResult<Option<i64>> {
        self.store().last_update(&SeriesKey::new(source, port))
    }

    /// Whether `file` is newer than what `(source, port)` already holds.
    ///
    /// Unparseable names are never updatable. With `check_last_update` off every
    /// file is, and the writer's stale guard is the only protection left.
    pub fn updatable(&self, file: &Path, source: &str, port: u16) -> ImportResult<bool> {
        if !self.config().import.check_last_update {
            return Ok(true);
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Ok(stamp) = parse_capture_name(&name) else {
            return Ok(false);
        };

        let checkpoint = self.last_update(source, port)?;
        let updatable = is_after_checkpoint(stamp.timestamp, checkpoint);
        trace!(
            file = %name,
            source,
            port,
            ?checkpoint,
            updatable,
            "Checked updatability"
        );
        Ok(updatable)
    }
}
