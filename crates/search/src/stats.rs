//! Per-strategy performance counters kept by the orchestrator.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct StrategyStats {
    pub executions: u64,
    pub failures: u64,
    pub results_returned: u64,
    pub total_duration: Duration,
}

#[derive(Default)]
pub struct SearchStatistics {
    per_strategy: Mutex<HashMap<String, StrategyStats>>,
}

impl SearchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StrategyStats>> {
        self.per_strategy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_execution(&self, strategy: &str, duration: Duration, results: usize) {
        let mut stats = self.lock();
        let entry = stats.entry(strategy.to_string()).or_default();
        entry.executions += 1;
        entry.results_returned += results as u64;
        entry.total_duration += duration;
    }

    pub fn record_failure(&self, strategy: &str, duration: Duration) {
        let mut stats = self.lock();
        let entry = stats.entry(strategy.to_string()).or_default();
        entry.executions += 1;
        entry.failures += 1;
        entry.total_duration += duration;
    }

    pub fn snapshot(&self) -> HashMap<String, StrategyStats> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = SearchStatistics::new();
        stats.record_execution("fts", Duration::from_millis(5), 3);
        stats.record_execution("fts", Duration::from_millis(7), 2);
        stats.record_failure("fts", Duration::from_millis(1));

        let snapshot = stats.snapshot();
        let fts = &snapshot["fts"];
        assert_eq!(fts.executions, 3);
        assert_eq!(fts.failures, 1);
        assert_eq!(fts.results_returned, 5);
        assert_eq!(fts.total_duration, Duration::from_millis(13));
    }
}
