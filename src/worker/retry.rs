//! In-memory retry tracker with exponential backoff.
//!
//! Counters are process-local: a restart resets them, which is fine
//! because unacknowledged stream messages are redelivered by the broker.
//! Restart-reset plus redelivery together give at-least-`max_retries`
//! attempts, never fewer.

use std::collections::HashMap;

#[derive(Debug)]
pub struct RetryTracker {
    attempts: HashMap<String, u32>,
    max_retries: u32,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts: HashMap::new(),
            max_retries,
        }
    }

    /// Increment and return the attempt count for a job.
    pub fn record_attempt(&mut self, job_id: &str) -> u32 {
        let count = self.attempts.entry(job_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// True while the job has attempts left.
    pub fn should_retry(&self, job_id: &str) -> bool {
        self.attempts.get(job_id).copied().unwrap_or(0) < self.max_retries
    }

    /// Drop a job from the tracker (on success or final failure).
    pub fn clear(&mut self, job_id: &str) {
        self.attempts.remove(job_id);
    }

    /// Exponential backoff: `min(2^(attempts-1), 60)` seconds.
    pub fn backoff_seconds(&self, job_id: &str) -> f64 {
        let attempts = self.attempts.get(job_id).copied().unwrap_or(1);
        let exponent = attempts.saturating_sub(1).min(32);
        (2f64).powi(exponent as i32).min(60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps_at_sixty() {
        let mut tracker = RetryTracker::new(10);

        tracker.record_attempt("j");
        assert_eq!(tracker.backoff_seconds("j"), 1.0);
        tracker.record_attempt("j");
        assert_eq!(tracker.backoff_seconds("j"), 2.0);
        tracker.record_attempt("j");
        assert_eq!(tracker.backoff_seconds("j"), 4.0);

        for _ in 0..7 {
            tracker.record_attempt("j");
        }
        assert_eq!(tracker.backoff_seconds("j"), 60.0);
    }

    #[test]
    fn test_stops_retrying_exactly_at_max() {
        let mut tracker = RetryTracker::new(3);

        assert_eq!(tracker.record_attempt("j"), 1);
        assert!(tracker.should_retry("j"));
        assert_eq!(tracker.record_attempt("j"), 2);
        assert!(tracker.should_retry("j"));
        assert_eq!(tracker.record_attempt("j"), 3);
        assert!(!tracker.should_retry("j"), "third of three attempts is the last");
    }

    #[test]
    fn test_clear_resets_counter() {
        let mut tracker = RetryTracker::new(2);

        tracker.record_attempt("j");
        tracker.record_attempt("j");
        assert!(!tracker.should_retry("j"));

        tracker.clear("j");
        assert!(tracker.should_retry("j"));
        assert_eq!(tracker.record_attempt("j"), 1);
    }

    #[test]
    fn test_jobs_tracked_independently() {
        let mut tracker = RetryTracker::new(2);

        tracker.record_attempt("a");
        tracker.record_attempt("a");
        tracker.record_attempt("b");

        assert!(!tracker.should_retry("a"));
        assert!(tracker.should_retry("b"));
    }
}
