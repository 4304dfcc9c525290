use tracing::debug;

/// Day-granular progress over all sources of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    total: usize,
    done: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { total, done: 0 }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Drops days a resumed source does not have to scan.
    pub fn skip(&mut self, days: usize) {
        self.total = self.total.saturating_sub(days);
    }

    pub fn advance(&mut self, step: usize, label: &str) {
        self.done += step;
        debug!(done = self.done, total = self.total, "{label}");
    }

    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done as f32 / self.total as f32).min(1.0)
    }
}
