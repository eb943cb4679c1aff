//! Prediction telemetry for the serving process.
//!
//! Counters and histogram buckets are plain atomics so concurrent requests
//! record without locking. `/metrics` renders them in the Prometheus text
//! exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Counter of predictions, labelled by outcome
pub const PREDICTIONS_METRIC: &str = "fraud_predictions_total";
/// Histogram of transform + scoring time
pub const LATENCY_METRIC: &str = "fraud_prediction_latency_seconds";

/// Upper bounds (seconds) of the latency buckets, `+Inf` implied
pub const LATENCY_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Prediction outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Fraud,
    NotFraud,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Fraud => "fraud",
            Outcome::NotFraud => "not_fraud",
        }
    }
}

impl From<bool> for Outcome {
    fn from(is_fraud: bool) -> Self {
        if is_fraud {
            Outcome::Fraud
        } else {
            Outcome::NotFraud
        }
    }
}

/// Fixed-bucket latency histogram
pub struct LatencyHistogram {
    /// Per-bucket (non-cumulative) counts; the last slot is `+Inf`
    buckets: [AtomicU64; LATENCY_BUCKETS.len() + 1],
    count: AtomicU64,
    sum_nanos: AtomicU64,
}

/// Point-in-time copy of a [`LatencyHistogram`]
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Cumulative counts per bucket, `+Inf` last
    pub cumulative: Vec<u64>,
    pub count: u64,
    pub sum_seconds: f64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, duration: Duration) {
        let secs = duration.as_secs_f64();
        let idx = LATENCY_BUCKETS
            .iter()
            .position(|&bound| secs <= bound)
            .unwrap_or(LATENCY_BUCKETS.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut running = 0;
        let cumulative = self
            .buckets
            .iter()
            .map(|b| {
                running += b.load(Ordering::Relaxed);
                running
            })
            .collect();

        HistogramSnapshot {
            cumulative,
            count: self.count.load(Ordering::Relaxed),
            sum_seconds: self.sum_nanos.load(Ordering::Relaxed) as f64 / 1e9,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics collector for the prediction path
pub struct PredictionMetrics {
    fraud: AtomicU64,
    not_fraud: AtomicU64,
    latency: LatencyHistogram,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PredictionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            fraud: AtomicU64::new(0),
            not_fraud: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
            start_time: Instant::now(),
        }
    }

    /// Record one completed prediction
    pub fn record_prediction(&self, outcome: Outcome, duration: Duration) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
        self.latency.observe(duration);
    }

    fn counter(&self, outcome: Outcome) -> &AtomicU64 {
        match outcome {
            Outcome::Fraud => &self.fraud,
            Outcome::NotFraud => &self.not_fraud,
        }
    }

    pub fn predictions(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    pub fn total_predictions(&self) -> u64 {
        self.predictions(Outcome::Fraud) + self.predictions(Outcome::NotFraud)
    }

    pub fn latency(&self) -> HistogramSnapshot {
        self.latency.snapshot()
    }

    /// Get current throughput (predictions per second since start)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_predictions() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Render in the Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        // Writing into a String cannot fail
        let _ = writeln!(out, "# HELP {} Total predictions", PREDICTIONS_METRIC);
        let _ = writeln!(out, "# TYPE {} counter", PREDICTIONS_METRIC);
        for outcome in [Outcome::Fraud, Outcome::NotFraud] {
            let _ = writeln!(
                out,
                "{}{{result=\"{}\"}} {}",
                PREDICTIONS_METRIC,
                outcome.label(),
                self.predictions(outcome)
            );
        }

        let snapshot = self.latency();
        let _ = writeln!(out, "# HELP {} Prediction latency", LATENCY_METRIC);
        let _ = writeln!(out, "# TYPE {} histogram", LATENCY_METRIC);
        for (bound, count) in LATENCY_BUCKETS.iter().zip(&snapshot.cumulative) {
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{:?}\"}} {}",
                LATENCY_METRIC, bound, count
            );
        }
        let _ = writeln!(
            out,
            "{}_bucket{{le=\"+Inf\"}} {}",
            LATENCY_METRIC,
            snapshot.cumulative.last().copied().unwrap_or(0)
        );
        let _ = writeln!(out, "{}_sum {:?}", LATENCY_METRIC, snapshot.sum_seconds);
        let _ = writeln!(out, "{}_count {}", LATENCY_METRIC, snapshot.count);

        out
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let total = self.total_predictions();
        let fraud = self.predictions(Outcome::Fraud);
        let fraud_rate = if total > 0 {
            fraud as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let latency = self.latency();
        let mean_latency_us = if latency.count > 0 {
            latency.sum_seconds / latency.count as f64 * 1e6
        } else {
            0.0
        };

        info!(
            predictions = total,
            fraud = fraud,
            not_fraud = self.predictions(Outcome::NotFraud),
            fraud_rate = format!("{:.2}%", fraud_rate),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            mean_latency_us = format!("{:.0}", mean_latency_us),
            "Prediction metrics summary"
        );
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic metrics reporter that logs a summary
pub struct MetricsReporter {
    metrics: Arc<PredictionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PredictionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}
