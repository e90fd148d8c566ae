//! Adaptive resync scheduling (§5): a watch stream alone never revisits
//! an object that has nothing new written to it, so anything mid-poll
//! (waiting on a device task, waiting on a multi-server maintenance
//! fan-out) would otherwise stall forever absent an unrelated external
//! edit. Every watcher merges its watch stream with a timer tick and
//! uses a `ResyncTracker` to decide, per object key, whether enough
//! time has passed to justify another pass.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fibonacci-paced backoff generalized from the teacher's minutes-per-step
/// version to a caller-supplied unit, so the same shape paces both a
/// multi-minute error retry and a several-seconds device task poll.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: u64,
    prev: u64,
    current: u64,
    max: u64,
}

impl FibonacciBackoff {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, prev: 0, current: min, max }
    }

    /// Returns the current step and advances to the next Fibonacci step,
    /// capped at `max`.
    pub fn next(&mut self) -> u64 {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    pub fn reset(&mut self) {
        self.prev = 0;
        self.current = self.min;
    }
}

/// Per-key due-time tracking for a poll loop: `is_due` only returns true
/// once a key's backoff has elapsed, so a fixed-rate timer tick can drive
/// many objects at their own adaptive cadence without a dedicated sleep
/// per object.
pub struct ResyncTracker {
    min_secs: u64,
    max_secs: u64,
    state: Mutex<HashMap<String, (FibonacciBackoff, Instant)>>,
}

impl ResyncTracker {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs, state: Mutex::new(HashMap::new()) }
    }

    /// True if `key` is due for a resync pass right now. A key seen for
    /// the first time is always due. Side effect: advances the key's
    /// backoff and due-time so repeated calls space themselves out.
    pub fn is_due(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert_with(|| (FibonacciBackoff::new(self.min_secs, self.max_secs), now));
        if now < entry.1 {
            return false;
        }
        let delay = entry.0.next();
        entry.1 = now + Duration::from_secs(delay);
        true
    }

    /// Drops tracking for `key`, e.g. once an object leaves the
    /// in-progress state it no longer needs polling for.
    pub fn clear(&self, key: &str) {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(5, 30);
        let steps: Vec<u64> = (0..7).map(|_| backoff.next()).collect();
        assert_eq!(steps, vec![5, 5, 10, 15, 25, 30, 30]);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(5, 30);
        backoff.next();
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), 5);
    }

    #[test]
    fn fresh_key_is_due_immediately() {
        let tracker = ResyncTracker::new(5, 30);
        assert!(tracker.is_due("a"));
    }

    #[test]
    fn key_is_not_due_again_right_after_being_scheduled() {
        let tracker = ResyncTracker::new(5, 30);
        assert!(tracker.is_due("a"));
        assert!(!tracker.is_due("a"));
    }

    #[test]
    fn cleared_key_is_due_immediately_again() {
        let tracker = ResyncTracker::new(5, 30);
        assert!(tracker.is_due("a"));
        tracker.clear("a");
        assert!(tracker.is_due("a"));
    }
}
