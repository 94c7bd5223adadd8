//! Progress and telemetry aggregation.
//!
//! Collapses the raw engine event stream into the latest percentage, an
//! elapsed/remaining estimate, and a bounded debug log. State is cleared at
//! the start of every attempt, not just every request, so a failed attempt
//! can never leak stale progress into the next one.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Retained debug log capacity; oldest lines are evicted first.
const DEBUG_LOG_CAPACITY: usize = 20;

/// Point-in-time view of a running (or finished) conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub percentage: u8,
    pub elapsed_seconds: f64,
    /// None until the first progress event arrives.
    pub remaining_seconds: Option<f64>,
    pub strategy_label: String,
    pub debug_log: Vec<String>,
}

/// Observer for progress snapshots. Events are advisory and lossy-tolerant;
/// only the latest snapshot matters to a consumer.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

/// No-op callback for when nobody is watching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressCallback;

impl ProgressCallback for NullProgressCallback {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

#[derive(Debug)]
pub struct ProgressTracker {
    percentage: u8,
    started: Instant,
    strategy_label: String,
    debug_log: VecDeque<String>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            percentage: 0,
            started: Instant::now(),
            strategy_label: String::new(),
            debug_log: VecDeque::with_capacity(DEBUG_LOG_CAPACITY),
        }
    }

    /// Starts a fresh attempt: percentage back to zero, log cleared, clock
    /// restarted, new strategy label.
    pub fn begin_attempt(&mut self, label: &str) {
        self.percentage = 0;
        self.started = Instant::now();
        self.strategy_label = label.to_string();
        self.debug_log.clear();
    }

    /// Clears everything, including the strategy label.
    pub fn clear(&mut self) {
        self.begin_attempt("");
    }

    /// Appends a log line, evicting the oldest once capacity is reached.
    pub fn record_log(&mut self, line: &str) {
        if self.debug_log.len() == DEBUG_LOG_CAPACITY {
            self.debug_log.pop_front();
        }
        self.debug_log
            .push_back(format!("{} {line}", chrono::Local::now().format("%H:%M:%S")));
    }

    /// Records a fractional progress value in 0.0..=1.0.
    pub fn record_ratio(&mut self, ratio: f64) {
        self.percentage = (ratio.clamp(0.0, 1.0) * 100.0).round() as u8;
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_seconds = self.started.elapsed().as_secs_f64();
        let remaining_seconds = if self.percentage > 0 {
            Some(elapsed_seconds / (f64::from(self.percentage) / 100.0) - elapsed_seconds)
        } else {
            None
        };
        ProgressSnapshot {
            percentage: self.percentage,
            elapsed_seconds,
            remaining_seconds,
            strategy_label: self.strategy_label.clone(),
            debug_log: self.debug_log.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_and_ordered() {
        let mut tracker = ProgressTracker::new();
        for i in 0..30 {
            tracker.record_log(&format!("line {i}"));
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.debug_log.len(), 20);
        assert!(snapshot.debug_log[0].ends_with("line 10"));
        assert!(snapshot.debug_log[19].ends_with("line 29"));
    }

    #[test]
    fn remaining_is_undefined_before_first_progress() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot().percentage, 0);
        assert!(tracker.snapshot().remaining_seconds.is_none());
    }

    #[test]
    fn remaining_extrapolates_from_elapsed() {
        let mut tracker = ProgressTracker::new();
        tracker.record_ratio(0.25);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.percentage, 25);
        // At 25% the remaining estimate is three times the elapsed time.
        let remaining = snapshot.remaining_seconds.unwrap();
        assert!((remaining - snapshot.elapsed_seconds * 3.0).abs() < 1e-6);
    }

    #[test]
    fn ratio_is_clamped() {
        let mut tracker = ProgressTracker::new();
        tracker.record_ratio(1.7);
        assert_eq!(tracker.snapshot().percentage, 100);
        tracker.record_ratio(-0.3);
        assert_eq!(tracker.snapshot().percentage, 0);
    }

    #[test]
    fn begin_attempt_clears_previous_state() {
        let mut tracker = ProgressTracker::new();
        tracker.record_log("old line");
        tracker.record_ratio(0.8);
        tracker.begin_attempt("second pass");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.percentage, 0);
        assert!(snapshot.debug_log.is_empty());
        assert_eq!(snapshot.strategy_label, "second pass");
        assert!(snapshot.remaining_seconds.is_none());
    }
}
