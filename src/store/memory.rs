use super::{SeriesKey, SeriesSchema, SeriesStore, StructureReport};
use crate::error::{ImportError, ImportResult};
use crate::record::Metrics;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct MemorySeries {
    schema: SeriesSchema,
    samples: Vec<(i64, Metrics)>,
}

/// In-process store with the same append rules as [`super::FileStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    series: BTreeMap<SeriesKey, MemorySeries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self, key: &SeriesKey) -> &[(i64, Metrics)] {
        self.series
            .get(key)
            .map(|s| s.samples.as_slice())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    pub fn schema(&self, key: &SeriesKey) -> Option<&SeriesSchema> {
        self.series.get(key).map(|s| &s.schema)
    }
}

impl SeriesStore for MemoryStore {
    fn last_update(&self, key: &SeriesKey) -> ImportResult<Option<i64>> {
        Ok(self
            .series
            .get(key)
            .and_then(|s| s.samples.last())
            .map(|(ts, _)| *ts))
    }

    fn exists(&self, key: &SeriesKey) -> ImportResult<bool> {
        Ok(self.series.contains_key(key))
    }

    fn create(&mut self, key: &SeriesKey, schema: &SeriesSchema) -> ImportResult<bool> {
        if self.series.contains_key(key) {
            return Ok(false);
        }
        self.series.insert(
            key.clone(),
            MemorySeries {
                schema: schema.clone(),
                samples: Vec::new(),
            },
        );
        Ok(true)
    }

    fn append(&mut self, key: &SeriesKey, timestamp: i64, metrics: &Metrics) -> ImportResult<()> {
        let series = self
            .series
            .get_mut(key)
            .ok_or_else(|| ImportError::MissingSeries(key.clone()))?;
        if let Some((last, _)) = series.samples.last()
            && timestamp <= *last
        {
            return Err(ImportError::StaleWrite {
                key: key.clone(),
                timestamp,
                last: *last,
            });
        }
        series.samples.push((timestamp, *metrics));
        Ok(())
    }

    fn validate_structure(
        &self,
        key: &SeriesKey,
        expected: &SeriesSchema,
    ) -> ImportResult<StructureReport> {
        Ok(match self.series.get(key) {
            None => StructureReport::valid(format!("series {key} does not exist yet")),
            Some(series) => StructureReport::compare(expected, &series.schema),
        })
    }

    fn reset(&mut self) -> ImportResult<usize> {
        let removed = self.series.len();
        self.series.clear();
        Ok(removed)
    }

    fn list(&self) -> ImportResult<Vec<SeriesKey>> {
        Ok(self.keys().cloned().collect())
    }
}
