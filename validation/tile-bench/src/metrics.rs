//! Latency statistics from Apache Bench timing files.

use bench_common::LatencyProfile;
use hdrhistogram::Histogram;
use tracing::debug;

/// Collects per-request total times (`ttime`, milliseconds).
pub struct LatencyCollector {
    histogram: Histogram<u64>,
    skipped: u64,
}

impl LatencyCollector {
    /// Create a new collector tracking three significant figures.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("3 significant figures is a valid precision"),
            skipped: 0,
        }
    }

    /// Record one request's total time in milliseconds.
    pub fn record_ms(&mut self, latency_ms: f64) {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            self.skipped += 1;
            return;
        }
        let latency_us = (latency_ms * 1000.0).round() as u64;
        if self.histogram.record(latency_us).is_err() {
            self.skipped += 1;
        }
    }

    /// Rows that could not be recorded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Summarize the recorded samples; `None` when nothing was recorded.
    pub fn profile(&self) -> Option<LatencyProfile> {
        if self.histogram.is_empty() {
            return None;
        }
        let ms = |us: u64| us as f64 / 1000.0;
        Some(LatencyProfile {
            samples: self.histogram.len(),
            min_ms: ms(self.histogram.min()),
            mean_ms: self.histogram.mean() / 1000.0,
            p50_ms: ms(self.histogram.value_at_percentile(50.0)),
            p90_ms: ms(self.histogram.value_at_percentile(90.0)),
            p95_ms: ms(self.histogram.value_at_percentile(95.0)),
            p99_ms: ms(self.histogram.value_at_percentile(99.0)),
            max_ms: ms(self.histogram.max()),
        })
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Summarize an `ab -g` timing file.
///
/// Rows are tab separated: `starttime seconds ctime dtime ttime wait`, where
/// `starttime` itself contains spaces. The header and malformed rows are
/// skipped.
pub fn latency_profile(timing: &str) -> Option<LatencyProfile> {
    let mut collector = LatencyCollector::new();
    for line in timing.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            if !line.trim().is_empty() {
                collector.skipped += 1;
            }
            continue;
        }
        // ttime is the second-to-last column
        match fields[fields.len() - 2].trim().parse::<f64>() {
            Ok(ttime) => collector.record_ms(ttime),
            Err(_) if fields[fields.len() - 2].trim() == "ttime" => {}
            Err(_) => collector.skipped += 1,
        }
    }
    if collector.skipped() > 0 {
        debug!(skipped = collector.skipped(), "Skipped malformed timing rows");
    }
    collector.profile()
}
