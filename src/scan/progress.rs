//! Progress tracking for a streaming run
//!
//! Keeps the running totals (rows streamed, windows done, windows planned)
//! and, when enabled, draws a progress bar over the windows on stderr.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Snapshot of the run's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    pub rows_streamed: u64,
    pub batches_completed: u64,
    pub batches_total: u64,
}

/// Progress tracker for a streaming run
pub struct ProgressTracker {
    rows_streamed: AtomicU64,
    batches_completed: AtomicU64,
    batches_total: AtomicU64,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        });

        Self {
            rows_streamed: AtomicU64::new(0),
            batches_completed: AtomicU64::new(0),
            batches_total: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Record the number of planned windows
    pub fn start(&self, batches_total: u64) {
        self.batches_total.store(batches_total, Ordering::Relaxed);
        if let Some(ref bar) = self.bar {
            bar.set_length(batches_total);
        }
    }

    /// Log a message without tearing the progress bar
    pub fn log(&self, message: &str) {
        match self.bar {
            Some(ref bar) => bar.suspend(|| info!("{}", message)),
            None => info!("{}", message),
        }
    }

    /// Account for one finished window
    ///
    /// # Returns
    /// * `RunningTotals` - Counters after this window
    pub fn window_done(&self, rows: u64) -> RunningTotals {
        let rows_streamed = self.rows_streamed.fetch_add(rows, Ordering::Relaxed) + rows;
        let batches_completed = self.batches_completed.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref bar) = self.bar {
            bar.set_position(batches_completed);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = rows_streamed as f64 / elapsed;
                bar.set_message(format!("{} rows ({:.0} rows/sec)", rows_streamed, speed));
            }
        }

        RunningTotals {
            rows_streamed,
            batches_completed,
            batches_total: self.batches_total.load(Ordering::Relaxed),
        }
    }

    /// Current counters
    pub fn totals(&self) -> RunningTotals {
        RunningTotals {
            rows_streamed: self.rows_streamed.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_total: self.batches_total.load(Ordering::Relaxed),
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let tracker = ProgressTracker::new(false);
        tracker.start(3);
        tracker.window_done(10);
        let totals = tracker.window_done(5);

        assert_eq!(
            totals,
            RunningTotals {
                rows_streamed: 15,
                batches_completed: 2,
                batches_total: 3,
            }
        );
        assert_eq!(tracker.totals(), totals);
    }

    #[test]
    fn test_empty_window_still_counts() {
        let tracker = ProgressTracker::new(false);
        tracker.start(1);
        let totals = tracker.window_done(0);
        assert_eq!(totals.rows_streamed, 0);
        assert_eq!(totals.batches_completed, 1);
    }

    #[test]
    fn test_hidden_bar_does_not_panic() {
        let tracker = ProgressTracker::new(true);
        tracker.start(2);
        tracker.log("batch 1");
        tracker.window_done(100);
        tracker.finish();
    }
}
