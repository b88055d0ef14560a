//! Dispatch statistics and send-latency collection.

use crate::error::{Result, SimulatorError};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Highest trackable latency: one minute, in microseconds
const MAX_LATENCY_US: u64 = 60_000_000;

/// Counters shared by every device loop.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub devices_connected: AtomicU64,
    pub connection_failures: AtomicU64,
    pub messages_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connected(&self) {
        self.devices_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

/// Latency statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    /// Formats latency as a human-readable string.
    pub fn format_ms(&self) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!(
                "p50={:.1}ms p95={:.1}ms p99={:.1}ms",
                self.p50_us as f64 / 1000.0,
                self.p95_us as f64 / 1000.0,
                self.p99_us as f64 / 1000.0
            )
        }
    }
}

/// Creates an empty latency histogram.
pub fn new_histogram() -> Result<Histogram<u64>> {
    Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, 3)
        .map_err(|e| SimulatorError::Metrics(e.to_string()))
}

/// Collects latency samples into a histogram until every sender is dropped.
pub async fn collect_latencies(
    mut rx: mpsc::UnboundedReceiver<Duration>,
) -> Result<Histogram<u64>> {
    let mut histogram = new_histogram()?;

    while let Some(duration) = rx.recv().await {
        let micros = (duration.as_micros() as u64).clamp(1, MAX_LATENCY_US);
        let _ = histogram.record(micros);
    }

    Ok(histogram)
}

/// Computes latency statistics from a histogram.
pub fn compute_latency_stats(histogram: &Histogram<u64>) -> LatencyStats {
    if histogram.is_empty() {
        return LatencyStats::default();
    }

    LatencyStats {
        count: histogram.len(),
        min_us: histogram.min(),
        max_us: histogram.max(),
        mean_us: histogram.mean() as u64,
        p50_us: histogram.value_at_quantile(0.50),
        p95_us: histogram.value_at_quantile(0.95),
        p99_us: histogram.value_at_quantile(0.99),
    }
}
