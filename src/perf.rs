//! Performance Metrics - latency sampling and summary statistics
//!
//! Every attempt is recorded (no sampling); the workload is small enough
//! that the full sample set fits in memory.

use serde::Serialize;
use std::time::Duration;

const NS_PER_MS: f64 = 1_000_000.0;
const NS_PER_SEC: f64 = 1_000_000_000.0;

/// Per-attempt latency samples, in nanoseconds
#[derive(Debug, Default, Clone)]
pub struct LatencyRecorder {
    pub latency_samples: Vec<u64>,
}

/// Reported latency figures, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl LatencyRecorder {
    pub fn with_capacity(capacity: usize) -> Self {
        LatencyRecorder {
            latency_samples: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn record(&mut self, elapsed: Duration) {
        self.record_ns(elapsed.as_nanos().min(u64::MAX as u128) as u64);
    }

    #[inline]
    pub fn record_ns(&mut self, latency_ns: u64) {
        self.latency_samples.push(latency_ns);
    }

    /// Absorb another recorder's samples (one per session)
    pub fn merge(&mut self, other: LatencyRecorder) {
        self.latency_samples.extend(other.latency_samples);
    }

    pub fn count(&self) -> usize {
        self.latency_samples.len()
    }

    /// Nearest-rank percentile: sort ascending, index `round(p/100 × (n−1))`
    /// with ties going to the even index
    ///
    /// # Arguments
    /// * `p` - Percentile (0-100), e.g., 95.0 for P95
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.latency_samples.is_empty() {
            return None;
        }
        let mut sorted = self.latency_samples.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round_ties_even() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn max_latency(&self) -> Option<u64> {
        self.latency_samples.iter().copied().max()
    }

    /// Arithmetic mean, in nanoseconds
    pub fn avg_latency(&self) -> Option<f64> {
        if self.latency_samples.is_empty() {
            return None;
        }
        Some(self.total_ns() as f64 / self.latency_samples.len() as f64)
    }

    /// Sum of all samples
    pub fn total_ns(&self) -> u128 {
        self.latency_samples.iter().map(|&ns| ns as u128).sum()
    }

    /// Mean / P95 / max in ms. An empty recorder summarises as all zeros.
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.count(),
            mean_ms: self.avg_latency().unwrap_or(0.0) / NS_PER_MS,
            p95_ms: self.percentile(95.0).unwrap_or(0) as f64 / NS_PER_MS,
            max_ms: self.max_latency().unwrap_or(0) as f64 / NS_PER_MS,
        }
    }

    /// Successes divided by the summed latency of all recorded attempts.
    ///
    /// This is not wall-clock throughput: time between attempts and overlap
    /// between concurrent sessions are both ignored.
    pub fn approx_throughput(&self, successes: usize) -> f64 {
        let total_sec = self.total_ns() as f64 / NS_PER_SEC;
        if total_sec > 0.0 {
            successes as f64 / total_sec
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> u64 {
        v * 1_000_000
    }

    #[test]
    fn test_percentile() {
        let mut perf = LatencyRecorder::default();
        for i in 1..=100 {
            perf.record_ns(i);
        }

        assert_eq!(perf.max_latency(), Some(100));
        // P50 of 1..100 with this formula rounds to 51 (50.5 rounded)
        let p50 = perf.percentile(50.0).unwrap();
        assert!(p50 == 50 || p50 == 51, "P50 should be ~50, got {}", p50);
        assert_eq!(perf.percentile(99.0), Some(99));
    }

    #[test]
    fn test_five_sample_summary() {
        let mut perf = LatencyRecorder::default();
        for v in [30, 10, 50, 20, 40] {
            perf.record_ns(ms(v));
        }

        let s = perf.summary();
        assert_eq!(s.count, 5);
        assert_eq!(s.p95_ms, 50.0);
        assert_eq!(s.mean_ms, 30.0);
        assert_eq!(s.max_ms, 50.0);
    }

    #[test]
    fn test_p95_tie_rounds_to_even_index() {
        // 0.95 × 30 = 28.5 lands on index 28, not 29
        let mut perf = LatencyRecorder::default();
        for v in 1..=31 {
            perf.record_ns(ms(v));
        }

        assert_eq!(perf.summary().p95_ms, 29.0);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let perf = LatencyRecorder::default();
        assert_eq!(perf.percentile(95.0), None);
        assert_eq!(
            perf.summary(),
            LatencySummary {
                count: 0,
                mean_ms: 0.0,
                p95_ms: 0.0,
                max_ms: 0.0,
            }
        );
        assert_eq!(perf.approx_throughput(0), 0.0);
    }

    #[test]
    fn test_throughput_uses_summed_latency() {
        let mut perf = LatencyRecorder::default();
        // 4 attempts × 250ms = 1s of attempt time
        for _ in 0..4 {
            perf.record(Duration::from_millis(250));
        }
        assert_eq!(perf.approx_throughput(3), 3.0);
    }

    #[test]
    fn test_merge() {
        let mut a = LatencyRecorder::default();
        a.record_ns(1);
        let mut b = LatencyRecorder::with_capacity(2);
        b.record_ns(2);
        b.record_ns(3);
        a.merge(b);
        assert_eq!(a.count(), 3);
        assert_eq!(a.total_ns(), 6);
    }
}
