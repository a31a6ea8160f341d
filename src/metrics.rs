//! Provider outcome metrics collection and reporting
//!
//! Keeps a bounded window of per-attempt records and computes success rates
//! and latency percentiles on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::DEFAULT_METRICS_RETENTION;
use crate::error::ErrorKind;
use crate::types::Category;

/// Outcome of one provider attempt (or one aggregated chain failure)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub provider_name: String,
    pub category: Category,
    pub success: bool,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub error_kind: Option<ErrorKind>,
}

impl MetricRecord {
    pub fn success(provider_name: &str, category: Category, duration: Duration) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            category,
            success: true,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            error_kind: None,
        }
    }

    pub fn failure(
        provider_name: &str,
        category: Category,
        duration: Duration,
        kind: ErrorKind,
    ) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            category,
            success: false,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            error_kind: Some(kind),
        }
    }

    fn is_rejection(&self) -> bool {
        self.error_kind.map(|k| k.is_rejection()).unwrap_or(false)
    }

    fn is_decline(&self) -> bool {
        self.error_kind.map(|k| k.is_decline()).unwrap_or(false)
    }
}

/// How a logical request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeMethod {
    Cache,
    Provider,
    Fallback,
}

/// Served-request counters for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedCounts {
    pub cache: u64,
    pub provider: u64,
    pub fallback: u64,
}

/// Aggregate over the matching records in the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Attempts (gate rejections excluded)
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls refused by the rate limiter or circuit breaker
    pub rejected: u64,
    /// Calls the vendor answered as not served; neither success nor failure
    pub declined: u64,
    /// Success rate over attempts (1.0 when there were none)
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    /// 50th percentile latency of successful attempts
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful attempts
    pub latency_p99_ms: f64,
}

impl MetricsSummary {
    /// Summary with no data
    pub fn empty() -> Self {
        Self {
            count: 0,
            successes: 0,
            failures: 0,
            rejected: 0,
            declined: 0,
            success_rate: 1.0,
            avg_duration_ms: 0.0,
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
        }
    }
}

/// Process-wide collector of provider outcomes
pub struct MetricsCollector {
    /// Rolling window of records
    records: Mutex<VecDeque<MetricRecord>>,
    retention: usize,
    served: Mutex<HashMap<Category, ServedCounts>>,
}

impl MetricsCollector {
    /// Creates a collector with the default retention window
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_METRICS_RETENTION)
    }

    /// Creates a collector keeping the last `retention` records
    pub fn with_retention(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(retention)),
            retention,
            served: Mutex::new(HashMap::new()),
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, VecDeque<MetricRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_served(&self) -> MutexGuard<'_, HashMap<Category, ServedCounts>> {
        self.served.lock().unwrap_or_else(|poisoned| {
            warn!("Served counters mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Appends a record, dropping the oldest once the window is full
    pub fn record(&self, record: MetricRecord) {
        let mut records = self.lock_records();
        if records.len() >= self.retention {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Counts how a request for `category` was answered
    pub fn record_served(&self, category: Category, method: ServeMethod) {
        let mut served = self.lock_served();
        let counts = served.entry(category).or_default();
        match method {
            ServeMethod::Cache => counts.cache += 1,
            ServeMethod::Provider => counts.provider += 1,
            ServeMethod::Fallback => counts.fallback += 1,
        }
    }

    /// Served counters for a category
    pub fn served(&self, category: Category) -> ServedCounts {
        self.lock_served()
            .get(&category)
            .copied()
            .unwrap_or_default()
    }

    /// Summarizes records matching the optional provider and category filters
    pub fn summary(&self, provider: Option<&str>, category: Option<Category>) -> MetricsSummary {
        let records = self.lock_records();
        let matching: Vec<&MetricRecord> = records
            .iter()
            .filter(|r| provider.map_or(true, |p| r.provider_name == p))
            .filter(|r| category.map_or(true, |c| r.category == c))
            .collect();

        if matching.is_empty() {
            return MetricsSummary::empty();
        }

        let rejected = matching.iter().filter(|r| r.is_rejection()).count() as u64;
        let declined = matching.iter().filter(|r| r.is_decline()).count() as u64;
        let attempts: Vec<&&MetricRecord> = matching
            .iter()
            .filter(|r| !r.is_rejection() && !r.is_decline())
            .collect();
        let count = attempts.len() as u64;
        let successes = attempts.iter().filter(|r| r.success).count() as u64;

        let mut latencies: Vec<f64> = attempts
            .iter()
            .filter(|r| r.success)
            .map(|r| r.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let avg_duration_ms = if count > 0 {
            attempts.iter().map(|r| r.duration_ms).sum::<f64>() / count as f64
        } else {
            0.0
        };

        MetricsSummary {
            count,
            successes,
            failures: count - successes,
            rejected,
            declined,
            success_rate: if count > 0 {
                successes as f64 / count as f64
            } else {
                1.0
            },
            avg_duration_ms,
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
        }
    }

    /// Copy of the retained records, oldest first
    pub fn records(&self) -> Vec<MetricRecord> {
        self.lock_records().iter().cloned().collect()
    }

    /// Drops every record and counter
    pub fn clear(&self) {
        self.lock_records().clear();
        self.lock_served().clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record(MetricRecord::success(
            "test",
            Category::Market,
            Duration::from_millis(100),
        ));
        collector.record(MetricRecord::success(
            "test",
            Category::Market,
            Duration::from_millis(200),
        ));
        collector.record(MetricRecord::failure(
            "test",
            Category::Market,
            Duration::from_millis(150),
            ErrorKind::Http,
        ));

        let summary = collector.summary(Some("test"), None);

        assert_eq!(summary.count, 3);
        assert_eq!(summary.failures, 1);
        assert!(summary.success_rate > 0.6 && summary.success_rate < 0.7);
        assert!((summary.avg_duration_ms - 150.0).abs() < 0.01);
    }

    #[test]
    fn test_summary_filters() {
        let collector = MetricsCollector::new();
        collector.record(MetricRecord::success("a", Category::Market, Duration::ZERO));
        collector.record(MetricRecord::success("a", Category::News, Duration::ZERO));
        collector.record(MetricRecord::success("b", Category::News, Duration::ZERO));

        assert_eq!(collector.summary(None, None).count, 3);
        assert_eq!(collector.summary(Some("a"), None).count, 2);
        assert_eq!(collector.summary(None, Some(Category::News)).count, 2);
        assert_eq!(collector.summary(Some("a"), Some(Category::News)).count, 1);
        assert_eq!(collector.summary(Some("c"), None), MetricsSummary::empty());
    }

    #[test]
    fn test_rejections_are_not_attempts() {
        let collector = MetricsCollector::new();
        collector.record(MetricRecord::success("a", Category::Market, Duration::ZERO));
        collector.record(MetricRecord::failure(
            "a",
            Category::Market,
            Duration::ZERO,
            ErrorKind::RateLimited,
        ));
        collector.record(MetricRecord::failure(
            "a",
            Category::Market,
            Duration::ZERO,
            ErrorKind::CircuitOpen,
        ));

        let summary = collector.summary(Some("a"), None);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.success_rate, 1.0);
    }

    #[test]
    fn test_declines_are_not_attempts() {
        let collector = MetricsCollector::new();
        collector.record(MetricRecord::success("a", Category::Market, Duration::ZERO));
        collector.record(MetricRecord::failure(
            "a",
            Category::Market,
            Duration::from_millis(40),
            ErrorKind::Unsupported,
        ));

        let summary = collector.summary(Some("a"), None);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.declined, 1);
        assert_eq!(summary.success_rate, 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let collector = MetricsCollector::with_retention(3);
        for i in 0..5 {
            collector.record(MetricRecord::success(
                "a",
                Category::Market,
                Duration::from_millis(i),
            ));
        }

        let records = collector.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].duration_ms, 2.0);
    }

    #[test]
    fn test_served_counters() {
        let collector = MetricsCollector::new();
        collector.record_served(Category::Market, ServeMethod::Provider);
        collector.record_served(Category::Market, ServeMethod::Cache);
        collector.record_served(Category::Market, ServeMethod::Cache);

        assert_eq!(
            collector.served(Category::Market),
            ServedCounts {
                cache: 2,
                provider: 1,
                fallback: 0
            }
        );
        assert_eq!(collector.served(Category::News), ServedCounts::default());
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
        assert_eq!(percentile(&values, 99.0), 10.0);
    }
}
