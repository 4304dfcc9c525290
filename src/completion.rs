use crate::capture::CaptureFile;
use std::collections::{BTreeMap, BTreeSet};


#[derive(Debug, Clone)]
pub struct PendingCapture {
    pub capture: CaptureFile,
    pub sources: BTreeSet<String>,
}

/// Tracks which sources hold data for each capture timestamp.
///
/// A timestamp is complete once `expected` distinct sources reported it.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    expected: usize,
    pending: BTreeMap<i64, PendingCapture>,
}

impl CompletionTracker {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            pending: BTreeMap::new(),
        }
    }

    /// Records `source` for the capture's timestamp and returns whether it is now complete.
    pub fn record(&mut self, capture: &CaptureFile, source: &str) -> bool {
        let entry = self
            .pending
            .entry(capture.timestamp())
            .or_insert_with(|| PendingCapture {
                capture: capture.clone(),
                sources: BTreeSet::new(),
            });
        entry.sources.insert(source.to_string());
        entry.sources.len() >= self.expected
    }

    pub fn is_complete(&self, timestamp: i64) -> bool {
        self.pending
            .get(&timestamp)
            .is_some_and(|p| p.sources.len() >= self.expected)
    }

    pub fn contributors(&self, timestamp: i64) -> usize {
        self.pending.get(&timestamp).map_or(0, |p| p.sources.len())
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns `timestamp` and every older entry, oldest first.
    pub fn take_through(&mut self, timestamp: i64) -> Vec<PendingCapture> {
        let newer = match timestamp.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.pending, newer).into_values().collect()
    }

    /// Drops `timestamp` and every older entry. Returns how many were dropped.
    pub fn discard_through(&mut self, timestamp: i64) -> usize {
        self.take_through(timestamp).len()
    }

    pub fn oldest(&self) -> Option<i64> {
        self.pending.keys().next().copied()
    }

    /// Empties the tracker in ascending timestamp order.
    pub fn drain(&mut self) -> Vec<PendingCapture> {
        std::mem::take(&mut self.pending).into_values().collect()
    }
}
