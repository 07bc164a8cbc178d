//! Dispatch latency tracking for the bus. Diagnostic only.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Latency statistics for one event type or message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    /// Dispatches measured.
    pub count: u64,
    /// Sum of all dispatch latencies.
    pub total: Duration,
    /// Fastest dispatch.
    pub min: Duration,
    /// Slowest dispatch.
    pub max: Duration,
}

impl LatencyStats {
    fn first(sample: Duration) -> Self {
        Self { count: 1, total: sample, min: sample, max: sample }
    }

    fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    /// Mean dispatch latency.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
    }
}

/// Per-key latency tracker with drain-pass bottleneck detection.
#[derive(Debug)]
pub struct PerformanceMonitor {
    latencies: BTreeMap<String, LatencyStats>,
    bottleneck_threshold: Duration,
    last_drain: Option<Duration>,
    bottleneck_passes: u64,
}

impl PerformanceMonitor {
    /// Creates a monitor flagging drain passes slower than `bottleneck_threshold`.
    #[must_use]
    pub fn new(bottleneck_threshold: Duration) -> Self {
        Self {
            latencies: BTreeMap::new(),
            bottleneck_threshold,
            last_drain: None,
            bottleneck_passes: 0,
        }
    }

    /// Records one dispatch of `key`.
    pub fn record_dispatch(&mut self, key: &str, latency: Duration) {
        match self.latencies.get_mut(key) {
            Some(stats) => stats.record(latency),
            None => {
                self.latencies.insert(key.to_string(), LatencyStats::first(latency));
            }
        }
    }

    /// Records a full drain pass; returns true if it was a bottleneck.
    pub fn record_drain(&mut self, elapsed: Duration, dispatched: usize) -> bool {
        self.last_drain = Some(elapsed);
        let bottleneck = elapsed > self.bottleneck_threshold;
        if bottleneck {
            self.bottleneck_passes += 1;
            warn!(
                elapsed_ms = elapsed.as_millis(),
                threshold_ms = self.bottleneck_threshold.as_millis(),
                dispatched,
                "Bus drain pass exceeded bottleneck threshold"
            );
        }
        bottleneck
    }

    /// Statistics for `key`.
    pub fn stats(&self, key: &str) -> Option<LatencyStats> {
        self.latencies.get(key).copied()
    }

    /// Statistics for every key seen.
    pub fn all_stats(&self) -> BTreeMap<String, LatencyStats> {
        self.latencies.clone()
    }

    /// Duration of the most recent drain pass.
    pub const fn last_drain(&self) -> Option<Duration> {
        self.last_drain
    }

    /// Drain passes flagged as bottlenecks.
    pub const fn bottleneck_passes(&self) -> u64 {
        self.bottleneck_passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats_accumulate() {
        let mut monitor = PerformanceMonitor::new(Duration::from_secs(1));
        monitor.record_dispatch("state-updated", Duration::from_millis(10));
        monitor.record_dispatch("state-updated", Duration::from_millis(30));
        monitor.record_dispatch("agent-failure", Duration::from_millis(5));

        let stats = monitor.stats("state-updated").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert_eq!(stats.average(), Duration::from_millis(20));
        assert_eq!(monitor.all_stats().len(), 2);
    }

    #[test]
    fn test_bottleneck_flag() {
        let mut monitor = PerformanceMonitor::new(Duration::from_millis(100));
        assert!(!monitor.record_drain(Duration::from_millis(50), 3));
        assert!(monitor.record_drain(Duration::from_millis(150), 3));
        assert_eq!(monitor.bottleneck_passes(), 1);
        assert_eq!(monitor.last_drain(), Some(Duration::from_millis(150)));
    }
}
