//! Progress reporting
//!
//! Reporters observe a step; they never influence control flow. Depending on
//! the configured [`ReportingMode`](ferry_core::ReportingMode) the executor
//! reports either the documents of a step or the records of each document.

use std::time::{Duration, Instant};

/// Observer of step progress
pub trait ProgressReporter: Send {
    /// A unit of work with `total` items begins
    fn start(&mut self, label: &str, total: u64);

    /// One item finished
    fn advance(&mut self);

    /// The unit of work is complete
    fn finish(&mut self);
}

/// Reporter that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&mut self, _label: &str, _total: u64) {}
    fn advance(&mut self) {}
    fn finish(&mut self) {}
}

/// Reporter that emits `tracing` events, at most once per interval
#[derive(Debug)]
pub struct LogReporter {
    label: String,
    total: u64,
    done: u64,
    started: Instant,
    last_report: Instant,
    interval: Duration,
}

impl LogReporter {
    /// Create a reporter that logs at most every `interval`
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            label: String::new(),
            total: 0,
            done: 0,
            started: now,
            last_report: now,
            interval,
        }
    }

    /// Items completed in the current unit of work
    pub fn done(&self) -> u64 {
        self.done
    }

    fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.done as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ProgressReporter for LogReporter {
    fn start(&mut self, label: &str, total: u64) {
        self.label = label.to_string();
        self.total = total;
        self.done = 0;
        self.started = Instant::now();
        self.last_report = self.started;
    }

    fn advance(&mut self) {
        self.done += 1;
        if self.last_report.elapsed() >= self.interval {
            tracing::info!(
                unit = %self.label,
                done = self.done,
                total = self.total,
                percentage = format!("{:.1}%", self.percentage()),
                "Progress"
            );
            self.last_report = Instant::now();
        }
    }

    fn finish(&mut self) {
        tracing::info!(
            unit = %self.label,
            done = self.done,
            total = self.total,
            elapsed = ?self.started.elapsed(),
            "Finished"
        );
    }
}
