use crate::capture::{CaptureFile, day_path};
use crate::checkpoint::is_after_checkpoint;
use crate::completion::{CompletionTracker, PendingCapture};
use crate::error::{ImportError, ImportResult, Outcome};
use crate::pipeline::Pipeline;
use crate::store::{SeriesKey, SeriesStore};
use crate::tool::FlowTool;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

pub mod progress;

#[cfg(test)]
mod tests;

pub use progress::Progress;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Wipe every series first and ignore checkpoints.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub sources_processed: usize,
    pub files_imported: usize,
    pub files_skipped: usize,
    pub failures: usize,
    pub port_samples: usize,
    pub progress: Progress,
}

/// Walks `<profile>/<source>/YYYY/MM/DD/` from a start date through today for every source.
pub struct Scanner<'p, T, S> {
    pipeline: &'p mut Pipeline<T, S>,
    options: ScanOptions,
    tracker: CompletionTracker,
    /// Oldest last update over the combined port series, `None` if any is empty.
    combined_checkpoint: Option<i64>,
    report: ScanReport,
}

fn day_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

fn days_inclusive(start: NaiveDate, end: NaiveDate) -> usize {
    if start > end {
        return 0;
    }
    (end - start).num_days() as usize + 1
}

impl<'p, T: FlowTool, S: SeriesStore> Scanner<'p, T, S> {
    pub fn new(pipeline: &'p mut Pipeline<T, S>, options: ScanOptions) -> Self {
        let expected = pipeline.config().general.sources.len();
        Self {
            pipeline,
            options,
            tracker: CompletionTracker::new(expected),
            combined_checkpoint: None,
            report: ScanReport::default(),
        }
    }

    pub fn run(self, start: NaiveDate) -> ImportResult<ScanReport> {
        self.run_until(start, Utc::now().date_naive())
    }

    /// Scans `start..=today`. Only fatal errors are returned; per-file problems are
    /// logged and counted in the report.
    pub fn run_until(mut self, start: NaiveDate, today: NaiveDate) -> ImportResult<ScanReport> {
        let sources = self.pipeline.config().general.sources.clone();

        let profile_dir = self.pipeline.config().profile_dir();
        if !profile_dir.is_dir() {
            return Err(ImportError::MissingProfileRoot(profile_dir));
        }

        if !self.options.force
            && let Some(first) = sources.first()
        {
            self.validate_store(first)?;
        }

        if self.options.force {
            let existing = self.pipeline.store().list()?;
            info!(series = existing.len(), "Resetting existing data");
            for key in &existing {
                debug!(series = %key, "Removing series");
            }
            let removed = self.pipeline.store_mut().reset()?;
            info!(removed, "Removed existing series");
        }

        if self.tracks_ports() && !self.options.force {
            self.combined_checkpoint = self.load_combined_checkpoint()?;
        }

        let days = days_inclusive(start, today);
        self.report.progress = Progress::new(days * sources.len());
        info!(sources = sources.len(), days, %start, %today, "Starting catch-up import");

        for (nr, source) in sources.iter().enumerate() {
            info!(source = %source, "Processing source {}/{}", nr + 1, sources.len());
            self.scan_source(source, start, today)?;
            self.report.sources_processed += 1;
        }

        self.write_combined_ports()?;

        if self.report.sources_processed == 0 {
            warn!("Import did not process any sources");
        }
        info!(
            sources = self.report.sources_processed,
            imported = self.report.files_imported,
            skipped = self.report.files_skipped,
            failures = self.report.failures,
            port_samples = self.report.port_samples,
            "Catch-up import finished"
        );
        Ok(self.report)
    }

    fn validate_store(&self, source: &str) -> ImportResult<()> {
        info!("Validating store structure");
        let key = SeriesKey::source(source);
        let report = self
            .pipeline
            .store()
            .validate_structure(&key, self.pipeline.schema())?;
        if !report.valid {
            return Err(ImportError::SchemaMismatch {
                key,
                message: format!("{}; rerun with --force to rebuild", report.message),
            });
        }
        debug!(series = %key, message = %report.message, "Store structure valid");
        Ok(())
    }

    fn tracks_ports(&self) -> bool {
        let config = self.pipeline.config();
        config.import.process_ports && !config.general.ports.is_empty()
    }

    fn load_combined_checkpoint(&self) -> ImportResult<Option<i64>> {
        let mut oldest: Option<i64> = None;
        for &port in &self.pipeline.config().general.ports {
            let Some(last) = self.pipeline.last_update("", port)? else {
                return Ok(None);
            };
            oldest = Some(oldest.map_or(last, |o| o.min(last)));
        }
        Ok(oldest)
    }

    fn scan_source(&mut self, source: &str, start: NaiveDate, today: NaiveDate) -> ImportResult<()> {
        let checkpoint = if self.options.force {
            None
        } else {
            self.pipeline.last_update(source, 0)?
        };

        // files already imported for the source may still be missing from the combined series
        let resume = match checkpoint {
            Some(last) if self.tracks_ports() => self.combined_checkpoint.map(|c| c.min(last)),
            other => other,
        };

        let mut date = start;
        if let Some(last) = resume
            && let Some(last_day) = day_of(last)
        {
            info!(source, last_update = %last_day, "Resuming from last update");
            if last_day > date {
                self.report.progress.skip(days_inclusive(date, last_day) - 1);
                date = last_day;
            }
        }

        let source_dir = self.pipeline.config().source_dir(source);
        while date <= today {
            self.scan_day(source, &source_dir, date, checkpoint)?;
            self.report.progress.advance(1, "Day scanned");
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }

    fn scan_day(
        &mut self,
        source: &str,
        source_dir: &Path,
        date: NaiveDate,
        checkpoint: Option<i64>,
    ) -> ImportResult<()> {
        let day_dir = source_dir.join(day_path(date));
        let entries = match fs::read_dir(&day_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?day_dir, "Day directory does not exist");
                return Ok(());
            }
            Err(e) => {
                warn!(path = ?day_dir, error = %e, "Could not list day directory");
                self.report.failures += 1;
                return Ok(());
            }
        };

        info!(path = ?day_dir, "Scanning path");
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        for name in names {
            self.scan_file(source, date, &name, checkpoint)?;
        }
        Ok(())
    }

    fn scan_file(
        &mut self,
        source: &str,
        date: NaiveDate,
        name: &str,
        checkpoint: Option<i64>,
    ) -> ImportResult<()> {
        let capture = match CaptureFile::in_day(date, name) {
            Ok(capture) => capture,
            Err(e) => {
                debug!(file = name, error = %e, "Not an importable file");
                self.report.files_skipped += 1;
                return Ok(());
            }
        };

        let timestamp = capture.timestamp();
        if !is_after_checkpoint(timestamp, checkpoint) {
            self.report.files_skipped += 1;
            if self.tracks_ports() && is_after_checkpoint(timestamp, self.combined_checkpoint) {
                debug!(file = name, source, "Already imported; pending combined ports");
                self.track(source, &capture)?;
            }
            return Ok(());
        }

        match self.import_capture(source, &capture) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(file = name, source, error = %e, "Caught error while importing file");
                self.report.failures += 1;
                Ok(())
            }
        }
    }

    fn import_capture(&mut self, source: &str, capture: &CaptureFile) -> ImportResult<()> {
        let process_ports = self.pipeline.config().import.process_ports;
        let by_source = self.pipeline.config().import.process_ports_by_source;

        match self.pipeline.write_source_data(capture, source)? {
            Outcome::Written => self.report.files_imported += 1,
            Outcome::NotUpdatable => self.report.files_skipped += 1,
        }

        if by_source {
            self.report.port_samples += self.pipeline.write_ports_data(capture, Some(source))?;
        }
        if process_ports {
            self.track(source, capture)?;
        }
        Ok(())
    }

    /// Records `source` for the capture and, once every source has it, writes the
    /// combined ports of that timestamp and of every older pending one.
    fn track(&mut self, source: &str, capture: &CaptureFile) -> ImportResult<()> {
        if !self.tracker.record(capture, source) {
            return Ok(());
        }
        for pending in self.tracker.take_through(capture.timestamp()) {
            self.write_combined(&pending)?;
        }
        Ok(())
    }

    /// Writes what is still pending after every source was scanned, oldest first.
    fn write_combined_ports(&mut self) -> ImportResult<()> {
        if !self.tracks_ports() {
            return Ok(());
        }
        for pending in self.tracker.drain() {
            self.write_combined(&pending)?;
        }
        Ok(())
    }

    fn write_combined(&mut self, pending: &PendingCapture) -> ImportResult<()> {
        if pending.sources.len() < self.tracker.expected() {
            debug!(
                file = %pending.capture.name(),
                reported = pending.sources.len(),
                expected = self.tracker.expected(),
                "Writing combined ports with partial sources"
            );
        }
        match self.pipeline.write_ports_data(&pending.capture, None) {
            Ok(written) => self.report.port_samples += written,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(file = %pending.capture.name(), error = %e, "Combined port import failed");
                self.report.failures += 1;
            }
        }
        Ok(())
    }
}
