use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

struct ErrorRecord {
    at: Instant,
    details: String,
}

/// Counts errors by kind within a sliding time window.
pub struct ErrorTracker {
    window: Duration,
    errors: Mutex<HashMap<String, VecDeque<ErrorRecord>>>,
}

impl ErrorTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            errors: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_error(&self, kind: &str, details: impl Into<String>) {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        let records = errors.entry(kind.to_string()).or_default();
        Self::prune(records, self.window);
        records.push_back(ErrorRecord {
            at: Instant::now(),
            details: details.into(),
        });
    }

    /// Errors of `kind` recorded within the window.
    pub fn error_count(&self, kind: &str) -> usize {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        match errors.get_mut(kind) {
            Some(records) => {
                Self::prune(records, self.window);
                records.len()
            }
            None => 0,
        }
    }

    /// Errors of `kind` per minute, averaged over the window.
    pub fn error_rate(&self, kind: &str) -> f64 {
        let count = self.error_count(kind) as f64;
        let minutes = self.window.as_secs_f64() / 60.0;
        if minutes > 0.0 { count / minutes } else { 0.0 }
    }

    /// Current in-window counts for every kind seen.
    pub fn all_errors(&self) -> HashMap<String, usize> {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        errors
            .iter_mut()
            .map(|(kind, records)| {
                Self::prune(records, self.window);
                (kind.clone(), records.len())
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// The details of the most recent error of `kind`, if any is in-window.
    pub fn last_error(&self, kind: &str) -> Option<String> {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        let records = errors.get_mut(kind)?;
        Self::prune(records, self.window);
        records.back().map(|r| r.details.clone())
    }

    pub fn clear(&self) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn prune(records: &mut VecDeque<ErrorRecord>, window: Duration) {
        let now = Instant::now();
        while let Some(front) = records.front() {
            if now.duration_since(front.at) >= window {
                records.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_by_kind() {
        let tracker = ErrorTracker::new(Duration::from_secs(3600));
        tracker.record_error("network", "timeout");
        tracker.record_error("network", "refused");
        tracker.record_error("exchange", "rate limited");

        assert_eq!(tracker.error_count("network"), 2);
        assert_eq!(tracker.error_count("exchange"), 1);
        assert_eq!(tracker.error_count("database"), 0);
        assert_eq!(tracker.last_error("network").as_deref(), Some("refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn old_errors_age_out() {
        let tracker = ErrorTracker::new(Duration::from_secs(60));
        tracker.record_error("network", "timeout");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.error_count("network"), 0);
        assert!(tracker.all_errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_is_per_minute() {
        let tracker = ErrorTracker::new(Duration::from_secs(120));
        tracker.record_error("network", "a");
        tracker.record_error("network", "b");
        tracker.record_error("network", "c");
        tracker.record_error("network", "d");

        assert!((tracker.error_rate("network") - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_everything() {
        let tracker = ErrorTracker::new(Duration::from_secs(3600));
        tracker.record_error("network", "timeout");
        tracker.clear();
        assert_eq!(tracker.error_count("network"), 0);
    }
}
