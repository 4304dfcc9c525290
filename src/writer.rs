use crate::capture::CaptureFile;
use crate::error::{ImportResult, Outcome};
use crate::pipeline::Pipeline;
use crate::record::AggregateRecord;
use crate::store::{SeriesKey, SeriesStore};
use crate::tool::FlowTool;
use tracing::{debug, info, warn};


impl<T: FlowTool, S: SeriesStore> Pipeline<T, S> {
    /// Creates the series with the configured schema if it does not exist yet.
    pub fn ensure_series(&mut self, key: &SeriesKey) -> ImportResult<bool> {
        let schema = self.schema().clone();
        let created = self.store_mut().create(key, &schema)?;
        if created {
            info!(series = %key, "Created series");
        }
        Ok(created)
    }

    /// Appends `record` to its series, creating the series on first use.
    ///
    /// A record not newer than the series' last sample is refused by the store with `StaleWrite`.
    pub fn write(&mut self, record: &AggregateRecord) -> ImportResult<Outcome> {
        let key = SeriesKey::new(record.source.clone(), record.port);
        self.ensure_series(&key)?;
        self.store_mut()
            .append(&key, record.timestamp, &record.metrics)?;
        debug!(record = %record, "Wrote sample");
        Ok(Outcome::Written)
    }

    /// Summarizes `capture` for `source` and writes the per-source series.
    pub fn write_source_data(
        &mut self,
        capture: &CaptureFile,
        source: &str,
    ) -> ImportResult<Outcome> {
        match self.summarize(capture, source)? {
            Some(record) => self.write(&record),
            None => Ok(Outcome::NotUpdatable),
        }
    }

    /// Writes the per-port series of `capture`, combined when `source` is `None`.
    ///
    /// Stale and other per-port failures are logged and skipped; only fatal errors
    /// are returned. Returns how many port samples were written.
    pub fn write_ports_data(
        &mut self,
        capture: &CaptureFile,
        source: Option<&str>,
    ) -> ImportResult<usize> {
        let records = self.breakdown(capture, source)?;
        let mut written = 0;
        for record in &records {
            match self.write(record) {
                Ok(_) => written += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(file = %capture.name(), port = record.port, error = %e, "Port sample not written")
                }
            }
        }
        Ok(written)
    }
}
