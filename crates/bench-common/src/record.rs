//! Normalized result of one load-generator run.

use crate::{BenchError, BenchResult, LayerId, Metric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters known to the caller before the load generator runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub test_id: String,
    pub layer: LayerId,
    pub description: String,
    pub concurrency: u32,
    pub total_requests: u64,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

impl RunParams {
    /// Create run parameters with a test id of the form `{layer}_c{concurrency}_{session}`.
    pub fn new(
        session_id: &str,
        layer: LayerId,
        description: impl Into<String>,
        concurrency: u32,
        total_requests: u64,
        url: impl Into<String>,
    ) -> BenchResult<Self> {
        if concurrency == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "concurrency for layer '{}' must be > 0",
                layer
            )));
        }
        if total_requests == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "total requests for layer '{}' must be > 0",
                layer
            )));
        }
        Ok(Self {
            test_id: format!("{}_c{}_{}", layer.file_stem(), concurrency, session_id),
            layer,
            description: description.into(),
            concurrency,
            total_requests,
            timestamp: Utc::now(),
            url: url.into(),
        })
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Outcome of the load-generator invocation itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { reason: String },
}

impl RunStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        RunStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed { .. })
    }
}

/// Metrics extracted from load-generator output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetrics {
    pub requests_per_second: Metric<f64>,
    pub mean_response_time_ms: Metric<f64>,
    pub failed_requests: Metric<u64>,
    pub transfer_rate_kbps: Metric<f64>,
    pub total_time_secs: Metric<f64>,
    pub complete_requests: Metric<u64>,
    pub non_2xx_responses: Metric<u64>,
}

/// Latency distribution summarized from a per-request timing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub samples: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// One load test execution at one (layer, concurrency) pair.
///
/// Immutable once created; the success rate is derived at construction.
/// Loading a stored record goes through the same construction, so a
/// stored success rate is recomputed rather than trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRunRecord")]
pub struct RunRecord {
    test_id: String,
    layer: LayerId,
    #[serde(default)]
    description: String,
    #[serde(rename = "concurrency_level")]
    concurrency: u32,
    total_requests: u64,
    timestamp: DateTime<Utc>,
    #[serde(rename = "tile_url")]
    url: String,
    status: RunStatus,
    #[serde(rename = "results")]
    metrics: RunMetrics,
    #[serde(default)]
    success_rate: Metric<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latency: Option<LatencyProfile>,
}

impl RunRecord {
    /// Build a record. A failed count above the total is inconsistent and is
    /// stored as unavailable.
    pub fn new(params: RunParams, mut metrics: RunMetrics, status: RunStatus) -> Self {
        if let Metric::Available(failed) = metrics.failed_requests {
            if failed > params.total_requests {
                metrics.failed_requests = Metric::Unavailable;
            }
        }
        let success_rate = metrics
            .failed_requests
            .and_then(|failed| success_rate(params.total_requests, failed));

        Self {
            test_id: params.test_id,
            layer: params.layer,
            description: params.description,
            concurrency: params.concurrency,
            total_requests: params.total_requests,
            timestamp: params.timestamp,
            url: params.url,
            status,
            metrics,
            success_rate,
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Option<LatencyProfile>) -> Self {
        self.latency = latency;
        self
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn layer(&self) -> &LayerId {
        &self.layer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn requests_per_second(&self) -> Metric<f64> {
        self.metrics.requests_per_second
    }

    pub fn mean_response_time_ms(&self) -> Metric<f64> {
        self.metrics.mean_response_time_ms
    }

    pub fn failed_requests(&self) -> Metric<u64> {
        self.metrics.failed_requests
    }

    pub fn transfer_rate_kbps(&self) -> Metric<f64> {
        self.metrics.transfer_rate_kbps
    }

    pub fn success_rate(&self) -> Metric<f64> {
        self.success_rate
    }

    pub fn latency(&self) -> Option<&LatencyProfile> {
        self.latency.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Usable for trend analysis: the run completed and reported a throughput.
    pub fn is_usable(&self) -> bool {
        !self.is_failed() && self.metrics.requests_per_second.is_available()
    }

    pub fn key(&self) -> (&LayerId, u32) {
        (&self.layer, self.concurrency)
    }
}

/// Document form of a [`RunRecord`] before its invariants are checked. A
/// stored `success_rate` is ignored.
#[derive(Deserialize)]
struct StoredRunRecord {
    test_id: String,
    layer: LayerId,
    #[serde(default)]
    description: String,
    #[serde(rename = "concurrency_level")]
    concurrency: u32,
    total_requests: u64,
    timestamp: DateTime<Utc>,
    #[serde(rename = "tile_url")]
    url: String,
    status: RunStatus,
    #[serde(rename = "results")]
    metrics: RunMetrics,
    #[serde(default)]
    latency: Option<LatencyProfile>,
}

impl TryFrom<StoredRunRecord> for RunRecord {
    type Error = BenchError;

    fn try_from(stored: StoredRunRecord) -> BenchResult<Self> {
        if stored.concurrency == 0 || stored.total_requests == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "record '{}' has concurrency {} and total requests {}; both must be > 0",
                stored.test_id, stored.concurrency, stored.total_requests
            )));
        }
        let params = RunParams {
            test_id: stored.test_id,
            layer: stored.layer,
            description: stored.description,
            concurrency: stored.concurrency,
            total_requests: stored.total_requests,
            timestamp: stored.timestamp,
            url: stored.url,
        };
        Ok(RunRecord::new(params, stored.metrics, stored.status).with_latency(stored.latency))
    }
}

/// Percentage of successful requests, rounded half away from zero to two
/// decimal places.
pub fn success_rate(total: u64, failed: u64) -> Metric<f64> {
    if total == 0 || failed > total {
        return Metric::Unavailable;
    }
    let rate = 100.0 * (total - failed) as f64 / total as f64;
    Metric::Available(round_to(rate, 2))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
