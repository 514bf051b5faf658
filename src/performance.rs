//! Timing and counters for server operations
//!
//! Collection is off until a client turns it on with
//! `sklsp.server.enableBenchmarking`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Default)]
pub struct PerformanceTracker {
    measurements: Mutex<HashMap<String, Vec<Duration>>>,
    counters: Mutex<HashMap<String, u64>>,
    enabled: AtomicBool,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            self.reset();
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.measurements
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push(duration);
    }

    pub fn increment(&self, counter: &str, amount: u64) {
        if !self.is_enabled() {
            return;
        }
        *self.counters.lock().entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn reset(&self) {
        self.measurements.lock().clear();
        self.counters.lock().clear();
    }

    pub fn generate_report(&self) -> String {
        let measurements = self.measurements.lock();
        let counters = self.counters.lock();

        let rule = "=".repeat(72);
        let mut report = String::new();
        let _ = writeln!(report, "{rule}\nsklsp performance report\n{rule}\n");

        let _ = writeln!(report, "TIMINGS");
        if measurements.is_empty() {
            let _ = writeln!(report, "  no timing data collected");
        }
        let mut ops: Vec<_> = measurements.iter().filter(|(_, t)| !t.is_empty()).collect();
        ops.sort_by_key(|(name, _)| name.as_str());
        for (operation, times) in ops {
            let mut sorted = times.clone();
            sorted.sort();
            let total: Duration = sorted.iter().sum();
            let _ = writeln!(
                report,
                "  {operation}: calls={} total={:.2}ms avg={:.2}ms \
                 p50={:.2}ms p95={:.2}ms max={:.2}ms",
                sorted.len(),
                ms(total),
                ms(total / sorted.len() as u32),
                ms(percentile(&sorted, 0.50)),
                ms(percentile(&sorted, 0.95)),
                ms(sorted[sorted.len() - 1]),
            );
        }

        let _ = writeln!(report, "\nCOUNTERS");
        if counters.is_empty() {
            let _ = writeln!(report, "  no counter data collected");
        }
        let mut items: Vec<_> = counters.iter().collect();
        items.sort_by_key(|(name, _)| name.as_str());
        for (name, value) in items {
            let _ = writeln!(report, "  {name}: {value}");
        }
        let _ = writeln!(report, "{rule}");
        report
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// `sorted` must be non-empty and ascending
fn percentile(sorted: &[Duration], fraction: f64) -> Duration {
    let index = ((sorted.len() as f64 * fraction) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// RAII guard recording the time until drop
pub struct TimingGuard<'a> {
    tracker: &'a PerformanceTracker,
    operation: &'static str,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(tracker: &'a PerformanceTracker, operation: &'static str) -> Self {
        tracker.increment(operation, 1);
        Self {
            tracker,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracker_records_nothing() {
        let tracker = PerformanceTracker::new();
        {
            let _timer = TimingGuard::new(&tracker, "lsp.hover");
        }
        assert!(tracker.generate_report().contains("no timing data collected"));
    }

    #[test]
    fn report_lists_operations_and_counters() {
        let tracker = PerformanceTracker::new();
        tracker.set_enabled(true);
        {
            let _timer = TimingGuard::new(&tracker, "index.flush");
        }
        tracker.record("index.flush", Duration::from_millis(3));
        tracker.increment("index.parsed", 4);

        let report = tracker.generate_report();
        assert!(report.contains("index.flush: calls=2"));
        assert!(report.contains("index.parsed: 4"));
        // the guard counts its own call
        assert!(report.contains("index.flush: 1"));
    }
}
