use crate::capture::CaptureFile;
use crate::completion::CompletionTracker;
use crate::error::{ImportResult, Outcome};
use crate::pipeline::Pipeline;
use crate::store::{SeriesKey, SeriesStore};
use crate::tool::FlowTool;
use std::path::Path;
use tracing::{debug, error, info, warn};


/// Captures pending longer than this behind the newest import are written with partial sources.
const PENDING_HORIZON_SECONDS: i64 = 3600;

/// What a single-file import managed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileImport {
    pub source_written: bool,
    pub source_ports: usize,
    pub combined_ports: usize,
}

/// Imports capture files one at a time as they arrive.
///
/// Keeps a completion tracker across calls so the combined port series is written
/// once all configured sources have reported a timestamp, even when no caller
/// marks itself as the last one.
pub struct Importer<T, S> {
    pipeline: Pipeline<T, S>,
    tracker: CompletionTracker,
}

impl<T: FlowTool, S: SeriesStore> Importer<T, S> {
    pub fn new(pipeline: Pipeline<T, S>) -> Self {
        let expected = pipeline.config().general.sources.len();
        Self {
            pipeline,
            tracker: CompletionTracker::new(expected),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<T, S> {
        &self.pipeline
    }

    /// Timestamps still waiting for sources before their combined ports are written.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn into_pipeline(self) -> Pipeline<T, S> {
        self.pipeline
    }

    /// Imports `file` for `source`. Errors are logged, never returned.
    pub fn import_file(&mut self, file: &Path, source: &str, last: bool) -> FileImport {
        info!(file = ?file, source, last, "Importing file");
        match self.try_import(file, source, last) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                error!(file = ?file, source, error = %e, "Import failed");
                FileImport::default()
            }
            Err(e) => {
                warn!(file = ?file, source, error = %e, "Caught error while importing file");
                FileImport::default()
            }
        }
    }

    fn try_import(&mut self, file: &Path, source: &str, last: bool) -> ImportResult<FileImport> {
        self.ensure_series_exist(source);

        let source_dir = self.pipeline.config().source_dir(source);
        let capture = CaptureFile::from_path(file)?.relative_to(&source_dir);
        let process_ports = self.pipeline.config().import.process_ports;
        let by_source = self.pipeline.config().import.process_ports_by_source;

        let mut result = FileImport::default();
        let reported = match self.pipeline.write_source_data(&capture, source) {
            Ok(outcome) => {
                result.source_written = outcome == Outcome::Written;
                true
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(file = %capture.name(), source, error = %e, "Source sample not written");
                false
            }
        };

        if process_ports {
            result.combined_ports = self.track(&capture, source, reported, last)?;
        }

        if by_source {
            result.source_ports = self.pipeline.write_ports_data(&capture, Some(source))?;
        }
        Ok(result)
    }

    /// Writes the combined ports once `capture` is complete or marked `last`.
    ///
    /// Entries past the pending horizon are written with whatever sources they have, and
    /// entries the combined series already covers are dropped.
    fn track(
        &mut self,
        capture: &CaptureFile,
        source: &str,
        reported: bool,
        last: bool,
    ) -> ImportResult<usize> {
        let timestamp = capture.timestamp();
        let complete = reported && self.tracker.record(capture, source);
        let mut written = 0;

        if last || complete {
            debug!(file = %capture.name(), last, complete, "Writing combined ports");
            let pending = self.tracker.take_through(timestamp);
            for older in pending.iter().filter(|p| p.capture.timestamp() < timestamp) {
                written += self.pipeline.write_ports_data(&older.capture, None)?;
            }
            written += self.pipeline.write_ports_data(capture, None)?;
        }

        let horizon = timestamp.saturating_sub(PENDING_HORIZON_SECONDS);
        if self.tracker.oldest().is_some_and(|oldest| oldest < horizon) {
            for stale in self.tracker.take_through(horizon.saturating_sub(1)) {
                debug!(
                    file = %stale.capture.name(),
                    reported = stale.sources.len(),
                    "Flushing combined ports past the pending horizon"
                );
                written += self.pipeline.write_ports_data(&stale.capture, None)?;
            }
        }

        if let Some(checkpoint) = self.combined_checkpoint()? {
            let dropped = self.tracker.discard_through(checkpoint);
            if dropped > 0 {
                debug!(dropped, checkpoint, "Dropped pending captures already in the store");
            }
        }
        Ok(written)
    }

    /// Oldest last update over the combined port series, `None` while any is empty.
    fn combined_checkpoint(&self) -> ImportResult<Option<i64>> {
        let mut oldest: Option<i64> = None;
        for &port in &self.pipeline.config().general.ports {
            let Some(last) = self.pipeline.last_update("", port)? else {
                return Ok(None);
            };
            oldest = Some(oldest.map_or(last, |o| o.min(last)));
        }
        Ok(oldest)
    }

    /// Creates the source series and its configured port series ahead of the first write.
    fn ensure_series_exist(&mut self, source: &str) {
        let ports = self.pipeline.config().general.ports.clone();
        let import = self.pipeline.config().import.clone();

        let mut keys = vec![SeriesKey::source(source)];
        if import.process_ports_by_source {
            keys.extend(ports.iter().map(|&port| SeriesKey::new(source, port)));
        }
        if import.process_ports {
            keys.extend(ports.iter().map(|&port| SeriesKey::combined(port)));
        }

        for key in keys {
            if let Err(e) = self.pipeline.ensure_series(&key) {
                warn!(series = %key, error = %e, "Error ensuring series exists");
            }
        }
    }
}
