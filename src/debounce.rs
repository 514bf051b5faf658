//! Fixed-deadline debounce timer
//!
//! Arming an already armed timer does nothing: the deadline is set by the first
//! event of a burst and later events never push it back. The timer does not
//! sleep on its own; callers pass the current instant, so tests can drive it
//! with any clock they like.

use std::time::Duration;

use tokio::time::Instant;

/// Default quiet period between the first change and the flush
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_period: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Debouncer {
            quiet_period,
            deadline: None,
        }
    }

    /// Only affects timers armed after the change
    pub fn set_quiet_period(&mut self, quiet_period: Duration) {
        self.quiet_period = quiet_period;
    }

    /// Arm the timer if idle. Returns the new deadline, or `None` when a
    /// deadline was already pending.
    pub fn arm(&mut self, now: Instant) -> Option<Instant> {
        if self.deadline.is_some() {
            return None;
        }
        let deadline = now + self.quiet_period;
        self.deadline = Some(deadline);
        Some(deadline)
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Called when the timer fires
    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(DEFAULT_QUIET_PERIOD)
    }
}
