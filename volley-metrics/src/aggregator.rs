use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::outcome::RequestOutcome;
use crate::percentile::{PercentileMode, Percentiles};
use crate::stats::RunningStats;

/// Distinct error messages tracked per run; the rest are folded into one bucket.
const MAX_ERROR_KINDS: usize = 64;
const OTHER_ERRORS: &str = "(other errors)";

/// Point-in-time statistics over every outcome recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// `success_count / total_requests * 100`, and `100.0` when nothing was recorded:
    /// an empty run has no failures.
    pub success_rate_percent: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub std_dev_ms: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub duration_ms: u64,
    pub throughput_per_sec: f64,
    pub errors: BTreeMap<String, u64>,
    pub requests: Vec<RequestMetrics>,
}

/// Per-request-name breakdown, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub name: String,
    pub total_requests: u64,
    pub success_count: u64,
    pub success_rate_percent: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone)]
struct SeriesStats {
    total: u64,
    success: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
    bytes_received: u64,
    bytes_sent: u64,
    running_ms: RunningStats,
    percentiles: Percentiles,
}

#[derive(Debug, Clone, Copy)]
struct SeriesSummary {
    total: u64,
    success: u64,
    success_rate: f64,
    avg_ms: f64,
    min_ms: f64,
    max_ms: f64,
    p50_ms: f64,
    p90_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
    stdev_ms: f64,
    bytes_received: u64,
    bytes_sent: u64,
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn success_rate(success: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    success as f64 / total as f64 * 100.0
}

impl SeriesStats {
    fn new(mode: PercentileMode) -> Self {
        Self {
            total: 0,
            success: 0,
            sum_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            bytes_received: 0,
            bytes_sent: 0,
            running_ms: RunningStats::default(),
            percentiles: Percentiles::new(mode),
        }
    }

    fn record(&mut self, outcome: &RequestOutcome) {
        let us: u64 = outcome.elapsed.as_micros().try_into().unwrap_or(u64::MAX);

        self.total = self.total.saturating_add(1);
        if outcome.success {
            self.success = self.success.saturating_add(1);
        }
        self.sum_us = self.sum_us.saturating_add(us);
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.bytes_received = self.bytes_received.saturating_add(outcome.bytes_received);
        self.bytes_sent = self.bytes_sent.saturating_add(outcome.bytes_sent);
        self.running_ms.push(us_to_ms(us));
        self.percentiles.record(us);
    }

    fn summarize(&mut self) -> SeriesSummary {
        let (avg_ms, min_ms, max_ms) = if self.total == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (
                us_to_ms(self.sum_us) / self.total as f64,
                us_to_ms(self.min_us),
                us_to_ms(self.max_us),
            )
        };

        SeriesSummary {
            total: self.total,
            success: self.success,
            success_rate: success_rate(self.success, self.total),
            avg_ms,
            min_ms,
            max_ms,
            p50_ms: us_to_ms(self.percentiles.percentile(50.0)),
            p90_ms: us_to_ms(self.percentiles.percentile(90.0)),
            p95_ms: us_to_ms(self.percentiles.percentile(95.0)),
            p99_ms: us_to_ms(self.percentiles.percentile(99.0)),
            stdev_ms: self.running_ms.stdev(),
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
        }
    }
}

#[derive(Debug)]
struct Inner {
    overall: SeriesStats,
    by_request: AHashMap<Arc<str>, SeriesStats>,
    request_order: Vec<Arc<str>>,
    errors: AHashMap<String, u64>,
    frozen_at: Option<Instant>,
}

/// Thread-safe streaming aggregate over `RequestOutcome`s.
///
/// Every update happens under one lock, so `snapshot` never observes a
/// half-applied outcome. After `freeze` further outcomes are ignored.
#[derive(Debug)]
pub struct MetricsAggregator {
    mode: PercentileMode,
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(PercentileMode::default())
    }
}

impl MetricsAggregator {
    #[must_use]
    pub fn new(mode: PercentileMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
            inner: Mutex::new(Inner {
                overall: SeriesStats::new(mode),
                by_request: AHashMap::new(),
                request_order: Vec::new(),
                errors: AHashMap::new(),
                frozen_at: None,
            }),
        }
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let mut inner = self.inner.lock();
        if inner.frozen_at.is_some() {
            return;
        }

        inner.overall.record(outcome);

        if let Some(series) = inner.by_request.get_mut(&outcome.request_name) {
            series.record(outcome);
        } else {
            let mut series = SeriesStats::new(self.mode);
            series.record(outcome);
            inner
                .by_request
                .insert(outcome.request_name.clone(), series);
            inner.request_order.push(outcome.request_name.clone());
        }

        if let Some(err) = &outcome.error {
            let tracked = inner.errors.len();
            let key = if tracked < MAX_ERROR_KINDS || inner.errors.contains_key(err.as_str()) {
                err.clone()
            } else {
                OTHER_ERRORS.to_string()
            };
            *inner.errors.entry(key).or_insert(0) += 1;
        }
    }

    /// Stop accepting outcomes. The elapsed run time is pinned to this moment.
    pub fn freeze(&self) {
        let mut inner = self.inner.lock();
        if inner.frozen_at.is_none() {
            inner.frozen_at = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen_at.is_some()
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.inner.lock().overall.total
    }

    pub fn snapshot(&self) -> RunMetrics {
        let mut inner = self.inner.lock();
        let elapsed = inner
            .frozen_at
            .map_or_else(|| self.started.elapsed(), |at| at - self.started);

        let overall = inner.overall.summarize();

        let Inner {
            by_request,
            request_order,
            errors,
            ..
        } = &mut *inner;

        let requests = request_order
            .iter()
            .filter_map(|name| {
                let s = by_request.get_mut(name)?.summarize();
                Some(RequestMetrics {
                    name: name.to_string(),
                    total_requests: s.total,
                    success_count: s.success,
                    success_rate_percent: s.success_rate,
                    avg_response_time_ms: s.avg_ms,
                    min_response_time_ms: s.min_ms,
                    max_response_time_ms: s.max_ms,
                    p90_ms: s.p90_ms,
                    p95_ms: s.p95_ms,
                })
            })
            .collect();

        let errors = errors.iter().map(|(k, v)| (k.clone(), *v)).collect();

        RunMetrics {
            total_requests: overall.total,
            success_count: overall.success,
            failure_count: overall.total - overall.success,
            success_rate_percent: overall.success_rate,
            avg_response_time_ms: overall.avg_ms,
            min_response_time_ms: overall.min_ms,
            max_response_time_ms: overall.max_ms,
            p50_ms: overall.p50_ms,
            p90_ms: overall.p90_ms,
            p95_ms: overall.p95_ms,
            p99_ms: overall.p99_ms,
            std_dev_ms: overall.stdev_ms,
            bytes_received: overall.bytes_received,
            bytes_sent: overall.bytes_sent,
            duration_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
            throughput_per_sec: throughput(overall.total, elapsed),
            errors,
            requests,
        }
    }
}

fn throughput(total: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    total as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ok(name: &str, ms: u64) -> RequestOutcome {
        RequestOutcome::success(Arc::from(name), Some(200), Duration::from_millis(ms), 10)
    }

    fn failed(name: &str, ms: u64, err: &str) -> RequestOutcome {
        RequestOutcome::failure(Arc::from(name), Duration::from_millis(ms), err)
    }

    #[test]
    fn empty_aggregator_reports_vacuous_success() {
        let agg = MetricsAggregator::default();
        let m = agg.snapshot();
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.success_rate_percent, 100.0);
        assert_eq!(m.p90_ms, 0.0);
        assert_eq!(m.p95_ms, 0.0);
        assert_eq!(m.avg_response_time_ms, 0.0);
        assert!(!m.success_rate_percent.is_nan());
        assert!(m.requests.is_empty());
    }

    #[test]
    fn five_samples_give_expected_summary() {
        let agg = MetricsAggregator::default();
        for ms in [10, 20, 30, 40, 50] {
            agg.record(&ok("r", ms));
        }
        let m = agg.snapshot();
        assert_eq!(m.total_requests, 5);
        assert_eq!(m.avg_response_time_ms, 30.0);
        assert_eq!(m.min_response_time_ms, 10.0);
        assert_eq!(m.max_response_time_ms, 50.0);
        assert_eq!(m.p90_ms, 50.0);
        assert_eq!(m.p95_ms, 50.0);
        assert_eq!(m.p50_ms, 30.0);
        assert_eq!(m.bytes_received, 50);
    }

    #[test]
    fn all_failures_yield_zero_success_rate() {
        let agg = MetricsAggregator::default();
        agg.record(&failed("a", 1, "connection refused"));
        agg.record(&failed("a", 2, "connection refused"));
        let m = agg.snapshot();
        assert_eq!(m.success_rate_percent, 0.0);
        assert_eq!(m.failure_count, 2);
        assert_eq!(m.errors.get("connection refused"), Some(&2));
    }

    #[test]
    fn breakdown_keeps_first_seen_order() {
        let agg = MetricsAggregator::default();
        agg.record(&ok("login", 5));
        agg.record(&failed("search", 7, "boom"));
        agg.record(&ok("login", 15));

        let m = agg.snapshot();
        let names: Vec<&str> = m.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["login", "search"]);
        assert_eq!(m.requests[0].total_requests, 2);
        assert_eq!(m.requests[0].avg_response_time_ms, 10.0);
        assert_eq!(m.requests[1].success_rate_percent, 0.0);
        assert!((m.success_rate_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn invariants_hold_for_mixed_samples() {
        let agg = MetricsAggregator::new(PercentileMode::Exact);
        for (i, ms) in [3u64, 99, 1, 47, 12, 8, 8, 65].into_iter().enumerate() {
            if i % 3 == 0 {
                agg.record(&failed("x", ms, "e"));
            } else {
                agg.record(&ok("x", ms));
            }
        }
        let m = agg.snapshot();
        assert!(m.success_count <= m.total_requests);
        assert!(m.min_response_time_ms <= m.avg_response_time_ms);
        assert!(m.avg_response_time_ms <= m.max_response_time_ms);
        assert!(m.p50_ms <= m.p90_ms && m.p90_ms <= m.p95_ms && m.p95_ms <= m.p99_ms);
    }

    #[test]
    fn freeze_stops_recording() {
        let agg = MetricsAggregator::default();
        agg.record(&ok("a", 1));
        agg.freeze();
        agg.record(&ok("a", 1));
        assert!(agg.is_frozen());
        assert_eq!(agg.snapshot().total_requests, 1);
    }

    #[test]
    fn error_kinds_are_bounded() {
        let agg = MetricsAggregator::default();
        for i in 0..(MAX_ERROR_KINDS + 10) {
            agg.record(&failed("a", 1, &format!("error {i}")));
        }
        let m = agg.snapshot();
        assert_eq!(m.errors.len(), MAX_ERROR_KINDS + 1);
        assert_eq!(m.errors.get(OTHER_ERRORS), Some(&10));
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let agg = Arc::new(MetricsAggregator::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        if i % 2 == 0 {
                            agg.record(&ok("a", t + 1));
                        } else {
                            agg.record(&failed("b", t + 1, "nope"));
                        }
                        let snap = agg.snapshot();
                        assert!(snap.success_count <= snap.total_requests);
                    }
                })
            })
            .collect();

        for h in handles {
            if h.join().is_err() {
                panic!("worker thread panicked");
            }
        }

        let m = agg.snapshot();
        assert_eq!(m.total_requests, 4000);
        assert_eq!(m.success_count, 2000);
        assert_eq!(m.success_rate_percent, 50.0);
    }

    #[test]
    fn run_metrics_serialize_with_contract_field_names() {
        let agg = MetricsAggregator::default();
        agg.record(&ok("a", 5));
        let json = serde_json::to_value(agg.snapshot()).unwrap_or_else(|e| panic!("{e}"));
        for key in [
            "totalRequests",
            "successCount",
            "successRatePercent",
            "avgResponseTimeMs",
            "minResponseTimeMs",
            "maxResponseTimeMs",
            "p90Ms",
            "p95Ms",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
