//! Per-resource-type timing and retry metrics.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregated counters for one resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeMetrics {
    /// Provider operations performed (successful or not)
    pub operations: u64,
    /// Provider calls, including retries
    pub attempts: u64,
    /// Attempts beyond the first
    pub retries: u64,
    /// Operations that failed after exhausting their attempts
    pub failures: u64,
    /// Wall time spent in provider operations, including backoff
    pub total_duration: Duration,
}

/// Metrics keyed by resource type name.
pub type RunMetrics = BTreeMap<String, TypeMetrics>;

/// Concurrent metrics accumulator for one run.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    by_type: DashMap<String, TypeMetrics>,
}

impl MetricsCollector {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one provider operation.
    pub fn record(&self, resource_type: &str, attempts: u32, duration: Duration, succeeded: bool) {
        let mut entry = self.by_type.entry(resource_type.to_string()).or_default();
        entry.operations += 1;
        entry.attempts += u64::from(attempts);
        entry.retries += u64::from(attempts.saturating_sub(1));
        if !succeeded {
            entry.failures += 1;
        }
        entry.total_duration += duration;
    }

    /// A sorted copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> RunMetrics {
        self.by_type.iter().map(|entry| (entry.key().clone(), *entry.value())).collect()
    }

    /// Log one summary line per resource type.
    pub fn log_summary(&self) {
        for (resource_type, metrics) in self.snapshot() {
            tracing::info!(
                "{resource_type}: {} operation(s), {} attempt(s), {} retr{}, {} failure(s), {:?}",
                metrics.operations,
                metrics.attempts,
                metrics.retries,
                if metrics.retries == 1 { "y" } else { "ies" },
                metrics.failures,
                metrics.total_duration
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let collector = MetricsCollector::new();
        collector.record("Test::Queue", 1, Duration::from_millis(5), true);
        collector.record("Test::Queue", 3, Duration::from_millis(20), false);
        collector.record("Test::Topic", 1, Duration::from_millis(1), true);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["Test::Queue", "Test::Topic"]);
        let queue = snapshot["Test::Queue"];
        assert_eq!(queue.operations, 2);
        assert_eq!(queue.attempts, 4);
        assert_eq!(queue.retries, 2);
        assert_eq!(queue.failures, 1);
        assert_eq!(queue.total_duration, Duration::from_millis(25));
        collector.log_summary();
    }
}
