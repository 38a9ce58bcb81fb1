//! Processed-entry counting and percent-complete math shared by every progress source.
//!
//! Ticks arrive either from `EntryProcessed` events (local runs) or from signal
//! file modification-time changes (remote runs). Both feed the same counter so
//! callers render progress identically regardless of dispatch mode.

/// Round a percentage to two decimal places.
#[must_use]
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counts processed ticks against the total captured at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCounter {
    total: usize,
    ticks: usize,
    finished: bool,
}

impl ProgressCounter {
    /// Start counting against `total` entries.
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            ticks: 0,
            finished: false,
        }
    }

    /// Record one observed tick. Ticks past `total + 1` are ignored, matching
    /// the guard the progress bar has always applied.
    pub const fn record_tick(&mut self) {
        if self.ticks <= self.total {
            self.ticks += 1;
        }
    }

    /// Mark the run finished; the counter then reports full completion.
    pub const fn finish(&mut self) {
        self.finished = true;
    }

    /// Total entries the run is expected to process.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Raw number of ticks observed so far.
    #[must_use]
    pub const fn ticks(&self) -> usize {
        self.ticks
    }

    /// Whether [`Self::finish`] has been called.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of entries shown as processed.
    ///
    /// The first tick of a run is the progress reset itself, so the entry
    /// count is one less than the tick count until the run finishes.
    #[must_use]
    pub const fn processed(&self) -> usize {
        if self.finished {
            return self.total;
        }
        let shown = self.ticks.saturating_sub(1);
        if shown > self.total { self.total } else { shown }
    }

    /// Percent complete: `min(100, round((ticks - 1) / total * 100, 2))`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.finished || self.total == 0 {
            return 100.0;
        }
        let shown = self.ticks.saturating_sub(1) as f64;
        round_percent(shown / self.total as f64 * 100.0).min(100.0)
    }
}
