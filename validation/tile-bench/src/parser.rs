//! Apache Bench output parsing.
//!
//! All label matching lives here. Every metric is located independently, so a
//! missing or reworded line only costs that one field.

use crate::metrics::latency_profile;
use bench_common::{Metric, RunMetrics, RunParams, RunRecord, RunStatus};
use std::str::FromStr;
use tracing::{debug, warn};

const REQUESTS_PER_SECOND: &str = "Requests per second:";
const TIME_PER_REQUEST: &str = "Time per request:";
const FAILED_REQUESTS: &str = "Failed requests:";
const TRANSFER_RATE: &str = "Transfer rate:";
const TIME_TAKEN: &str = "Time taken for tests:";
const COMPLETE_REQUESTS: &str = "Complete requests:";
const NON_2XX: &str = "Non-2xx responses:";

/// What the load generator handed back for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutput {
    /// Process exit code; `None` when killed by a signal or never started
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Contents of the per-request timing file, when one was written
    pub timing_data: Option<String>,
}

impl LoadOutput {
    /// A successful invocation with the given standard output.
    pub fn completed(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// An invocation the caller aborted after its timeout.
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    /// An invocation that could not be started at all.
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stderr: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_timing_data(mut self, timing: Option<String>) -> Self {
        self.timing_data = timing;
        self
    }

    /// Why the invocation counts as failed, if it does.
    pub fn failure_reason(&self) -> Option<String> {
        if self.timed_out {
            return Some("load generator timed out".to_string());
        }
        match self.exit_code {
            Some(0) => None,
            Some(code) => Some(match first_line(&self.stderr) {
                Some(line) => format!("exit status {}: {}", code, line),
                None => format!("exit status {}", code),
            }),
            None => Some(match first_line(&self.stderr) {
                Some(line) => format!("terminated without exit status: {}", line),
                None => "terminated without exit status".to_string(),
            }),
        }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Extract every known metric from load-generator output.
pub fn parse_metrics(text: &str) -> RunMetrics {
    RunMetrics {
        requests_per_second: metric(text, REQUESTS_PER_SECOND, |_| true).and_then(Metric::<f64>::finite),
        mean_response_time_ms: metric(text, TIME_PER_REQUEST, |line| {
            line.contains("(mean)") && !line.contains("across all")
        })
        .and_then(Metric::<f64>::finite),
        failed_requests: metric(text, FAILED_REQUESTS, |_| true),
        transfer_rate_kbps: metric(text, TRANSFER_RATE, |_| true).and_then(Metric::<f64>::finite),
        total_time_secs: metric(text, TIME_TAKEN, |_| true).and_then(Metric::<f64>::finite),
        complete_requests: metric(text, COMPLETE_REQUESTS, |_| true),
        non_2xx_responses: metric(text, NON_2XX, |_| true),
    }
}

/// Locate the first line starting with `label` and parse the token after it.
fn metric<T: FromStr>(text: &str, label: &str, accept: impl Fn(&str) -> bool) -> Metric<T> {
    let Some(token) = text
        .lines()
        .map(str::trim_start)
        .filter(|line| accept(line))
        .find_map(|line| line.strip_prefix(label))
        .map(|rest| rest.split_whitespace().next().unwrap_or(""))
    else {
        return Metric::Unavailable;
    };

    match token.parse::<T>() {
        Ok(value) => Metric::Available(value),
        Err(_) => {
            debug!(label = label, value = token, "Unparseable metric value");
            Metric::Unavailable
        }
    }
}

fn has_any_metric(metrics: &RunMetrics) -> bool {
    metrics.requests_per_second.is_available()
        || metrics.mean_response_time_ms.is_available()
        || metrics.failed_requests.is_available()
        || metrics.transfer_rate_kbps.is_available()
        || metrics.total_time_secs.is_available()
        || metrics.complete_requests.is_available()
}

/// Normalize one invocation into a RunRecord.
///
/// Always produces a record. A failed invocation still contributes whatever
/// partial metrics its output contains.
pub fn parse_run(params: RunParams, output: &LoadOutput) -> RunRecord {
    let metrics = parse_metrics(&output.stdout);

    if let Metric::Available(failed) = metrics.failed_requests {
        if failed > params.total_requests {
            warn!(
                test_id = %params.test_id,
                failed = failed,
                total = params.total_requests,
                "Failed request count exceeds total; marking it unavailable"
            );
        }
    }

    let status = match output.failure_reason() {
        Some(reason) => RunStatus::failed(reason),
        None if !has_any_metric(&metrics) => RunStatus::failed("no parseable output"),
        None => RunStatus::Completed,
    };

    let latency = output.timing_data.as_deref().and_then(latency_profile);

    RunRecord::new(params, metrics, status).with_latency(latency)
}
