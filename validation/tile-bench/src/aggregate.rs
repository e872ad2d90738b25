//! Session aggregation into report-ready summaries.

use bench_common::{round_to, IntegrityIssue, LayerId, Metric, RunRecord, Session};
use serde::Serialize;
use std::fmt;

/// Average success rate (percent) below which lower concurrency is advised.
pub const MIN_SUCCESS_RATE: f64 = 95.0;
/// Average response time (ms) above which server capacity is suspect.
pub const MAX_MEAN_RESPONSE_MS: f64 = 1000.0;
/// Average throughput (requests per second) below which it is called low.
pub const MIN_MEAN_RPS: f64 = 10.0;

/// Failure totals over records that report a failed-request count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FailureTally {
    pub failed: u64,
    pub requests: u64,
    /// Records left out because their failed count is unavailable.
    pub excluded: usize,
}

impl FailureTally {
    fn add(&mut self, record: &RunRecord) {
        match record.failed_requests() {
            Metric::Available(failed) => {
                self.failed += failed;
                self.requests += record.total_requests();
            }
            Metric::Unavailable => self.excluded += 1,
        }
    }

    /// Σfailed / Σtotal × 100, two decimals.
    pub fn rate(&self) -> Metric<f64> {
        if self.requests == 0 {
            return Metric::Unavailable;
        }
        Metric::Available(round_to(
            100.0 * self.failed as f64 / self.requests as f64,
            2,
        ))
    }
}

/// Derived figures for one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub layer: LayerId,
    pub title: String,
    /// (concurrency, RPS) of usable records in configured order.
    pub series: Vec<(u32, f64)>,
    pub mean_rps: Metric<f64>,
    pub degrading: bool,
    pub best_concurrency: Option<u32>,
    pub worst_concurrency: Option<u32>,
    pub highest_successful_concurrency: Option<u32>,
    pub failures: FailureTally,
    pub records: usize,
}

impl LayerSummary {
    pub fn failure_rate(&self) -> Metric<f64> {
        self.failures.rate()
    }

    pub fn has_data(&self) -> bool {
        !self.series.is_empty()
    }
}

/// Advice derived from session-wide averages and per-layer throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    LowSuccessRate { success_rate: f64 },
    HighResponseTime { mean_ms: f64 },
    LowThroughput { mean_rps: f64 },
    BestLayer { layer: LayerId, title: String, mean_rps: f64 },
    WorstLayer { layer: LayerId, title: String, mean_rps: f64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::LowSuccessRate { success_rate } => write!(
                f,
                "Average success rate {:.2}% is below {}%; consider reducing concurrency levels",
                success_rate, MIN_SUCCESS_RATE
            ),
            Recommendation::HighResponseTime { mean_ms } => write!(
                f,
                "Average response time {:.2} ms exceeds {} ms; investigate server capacity",
                mean_ms, MAX_MEAN_RESPONSE_MS
            ),
            Recommendation::LowThroughput { mean_rps } => write!(
                f,
                "Average throughput {:.2} RPS is below {} RPS; consider optimizing the server configuration",
                mean_rps, MIN_MEAN_RPS
            ),
            Recommendation::BestLayer { layer, title, mean_rps } => write!(
                f,
                "Best performing layer: {} at {:.1} RPS average",
                layer_label(layer, title),
                mean_rps
            ),
            Recommendation::WorstLayer { layer, title, mean_rps } => write!(
                f,
                "Investigate optimization opportunities for: {} at {:.1} RPS average",
                layer_label(layer, title),
                mean_rps
            ),
        }
    }
}

fn layer_label(layer: &LayerId, title: &str) -> String {
    if title == layer.as_str() {
        title.to_string()
    } else {
        format!("{} ({})", title, layer)
    }
}

/// Everything a report needs besides the raw records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub session_id: String,
    pub tests_run: usize,
    pub completed: usize,
    pub failed: usize,
    pub failures: FailureTally,
    /// Means over usable records that report the metric.
    pub mean_rps: Metric<f64>,
    pub mean_response_ms: Metric<f64>,
    pub mean_success_rate: Metric<f64>,
    pub layers: Vec<LayerSummary>,
    pub integrity_issues: Vec<IntegrityIssue>,
}

impl SummaryView {
    pub fn failure_rate(&self) -> Metric<f64> {
        self.failures.rate()
    }

    pub fn excluded(&self) -> usize {
        self.failures.excluded
    }

    pub fn layer(&self, id: &LayerId) -> Option<&LayerSummary> {
        self.layers.iter().find(|l| &l.layer == id)
    }

    /// Threshold advice first, then the best and worst layer by mean RPS.
    ///
    /// A worst layer is only named when it differs from the best one.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();
        if let Metric::Available(success_rate) = self.mean_success_rate {
            if success_rate < MIN_SUCCESS_RATE {
                out.push(Recommendation::LowSuccessRate { success_rate });
            }
        }
        if let Metric::Available(mean_ms) = self.mean_response_ms {
            if mean_ms > MAX_MEAN_RESPONSE_MS {
                out.push(Recommendation::HighResponseTime { mean_ms });
            }
        }
        if let Metric::Available(mean_rps) = self.mean_rps {
            if mean_rps < MIN_MEAN_RPS {
                out.push(Recommendation::LowThroughput { mean_rps });
            }
        }

        let ranked: Vec<(usize, f64)> = self
            .layers
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.mean_rps.value().map(|rps| (i, rps)))
            .collect();
        // first maximum and first minimum, so ties keep catalog order
        let best = ranked
            .iter()
            .copied()
            .fold(None, |acc: Option<(usize, f64)>, (i, rps)| match acc {
                Some((_, top)) if rps <= top => acc,
                _ => Some((i, rps)),
            });
        let worst = ranked
            .iter()
            .copied()
            .fold(None, |acc: Option<(usize, f64)>, (i, rps)| match acc {
                Some((_, low)) if rps >= low => acc,
                _ => Some((i, rps)),
            });

        if let Some((i, mean_rps)) = best {
            let layer = &self.layers[i];
            out.push(Recommendation::BestLayer {
                layer: layer.layer.clone(),
                title: layer.title.clone(),
                mean_rps,
            });
            if let Some((j, mean_rps)) = worst.filter(|(j, _)| *j != i) {
                let layer = &self.layers[j];
                out.push(Recommendation::WorstLayer {
                    layer: layer.layer.clone(),
                    title: layer.title.clone(),
                    mean_rps,
                });
            }
        }
        out
    }
}

/// Computes summaries over a frozen session.
pub struct Aggregator<'a> {
    session: &'a Session,
}

impl<'a> Aggregator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn summarize(&self) -> SummaryView {
        let records = self.session.records();
        let mut failures = FailureTally::default();
        for record in records {
            failures.add(record);
        }
        let failed = records.iter().filter(|r| r.is_failed()).count();
        let usable = || records.iter().filter(|r| r.is_usable());

        let layers = self
            .session
            .layers()
            .iter()
            .map(|spec| self.layer_summary(&spec.id, spec.title()))
            .collect();

        SummaryView {
            session_id: self.session.id().to_string(),
            tests_run: records.len(),
            completed: records.len() - failed,
            failed,
            failures,
            mean_rps: average(usable().filter_map(|r| r.requests_per_second().value())),
            mean_response_ms: average(usable().filter_map(|r| r.mean_response_time_ms().value())),
            mean_success_rate: average(usable().filter_map(|r| r.success_rate().value())),
            layers,
            integrity_issues: self.session.integrity_issues(),
        }
    }

    /// Summary of one layer; an unknown layer yields an empty summary.
    pub fn layer_summary(&self, layer: &LayerId, title: &str) -> LayerSummary {
        let levels = self.session.concurrency_levels();
        let mut failures = FailureTally::default();
        let mut series = Vec::new();
        let mut highest_successful = None;
        let mut count = 0;

        for record in self.session.records_for(layer) {
            count += 1;
            failures.add(record);
            if !levels.contains(&record.concurrency()) {
                continue;
            }
            if let (true, Metric::Available(rps)) = (record.is_usable(), record.requests_per_second()) {
                series.push((record.concurrency(), rps));
                if record.failed_requests() == Metric::Available(0) {
                    highest_successful = highest_successful.max(Some(record.concurrency()));
                }
            }
        }

        LayerSummary {
            layer: layer.clone(),
            title: title.to_string(),
            mean_rps: average(series.iter().map(|(_, rps)| *rps)),
            degrading: is_degrading(&series),
            best_concurrency: extreme(&series, |candidate, current| candidate > current),
            worst_concurrency: extreme(&series, |candidate, current| candidate < current),
            highest_successful_concurrency: highest_successful,
            failures,
            records: count,
            series,
        }
    }
}

fn average(values: impl Iterator<Item = f64>) -> Metric<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return Metric::Unavailable;
    }
    Metric::<f64>::finite(sum / count as f64)
}

/// RPS at the highest tested concurrency is below RPS at the lowest.
fn is_degrading(series: &[(u32, f64)]) -> bool {
    let lowest = series.iter().min_by_key(|(c, _)| *c);
    let highest = series.iter().max_by_key(|(c, _)| *c);
    match (lowest, highest) {
        (Some((lo, lo_rps)), Some((hi, hi_rps))) if lo != hi => hi_rps < lo_rps,
        _ => false,
    }
}

/// Concurrency whose RPS wins under `better`; ties go to the lowest concurrency.
fn extreme(series: &[(u32, f64)], better: impl Fn(f64, f64) -> bool) -> Option<u32> {
    let mut best: Option<(u32, f64)> = None;
    for &(concurrency, rps) in series {
        best = match best {
            None => Some((concurrency, rps)),
            Some((c, r)) if better(rps, r) || (rps == r && concurrency < c) => Some((concurrency, rps)),
            keep => keep,
        };
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_common::{LayerCatalog, LayerSpec, RunMetrics, RunParams, RunStatus, SessionMeta};
    use chrono::Utc;
    use test_utils::{assert_approx_eq, assert_series_approx_eq};

    fn meta(levels: Vec<u32>) -> SessionMeta {
        SessionMeta {
            id: "20241114_123000".to_string(),
            name: "suite".to_string(),
            server: "localhost".to_string(),
            created_at: Utc::now(),
            total_requests_per_test: 1000,
            concurrency_levels: levels,
            layers: LayerCatalog::new([
                LayerSpec::new("A", "Layer A"),
                LayerSpec::new("B", ""),
            ])
            .unwrap(),
        }
    }

    fn record(layer: &str, concurrency: u32, total: u64, rps: Metric<f64>, failed: Metric<u64>) -> RunRecord {
        let params =
            RunParams::new("20241114_123000", LayerId::new(layer), "", concurrency, total, "url").unwrap();
        let metrics = RunMetrics {
            requests_per_second: rps,
            failed_requests: failed,
            ..Default::default()
        };
        RunRecord::new(params, metrics, RunStatus::Completed)
    }

    fn ok(layer: &str, concurrency: u32, rps: f64, failed: u64) -> RunRecord {
        record(layer, concurrency, 1000, Metric::Available(rps), Metric::Available(failed))
    }

    #[test]
    fn test_degradation_detected() {
        let session = Session::new(meta(vec![1, 100]), vec![ok("A", 1, 900.0, 0), ok("A", 100, 400.0, 0)]);
        let summary = Aggregator::new(&session).summarize();
        let a = summary.layer(&LayerId::new("A")).unwrap();

        assert!(a.degrading);
        assert_series_approx_eq!(a.series, vec![(1, 900.0), (100, 400.0)], 1e-9);
        assert_approx_eq!(a.mean_rps.value().unwrap(), 650.0, 1e-9);
        assert_eq!(a.best_concurrency, Some(1));
        assert_eq!(a.worst_concurrency, Some(100));
        assert_eq!(a.title, "Layer A");
    }

    #[test]
    fn test_failure_rate_excludes_unavailable_counts() {
        let session = Session::new(
            meta(vec![1, 10]),
            vec![
                ok("A", 1, 100.0, 10),
                record("A", 10, 500, Metric::Available(50.0), Metric::Unavailable),
            ],
        );
        let summary = Aggregator::new(&session).summarize();

        assert_eq!(summary.failure_rate(), Metric::Available(1.0));
        assert_eq!(summary.excluded(), 1);
        assert_eq!(summary.tests_run, 2);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn test_ties_prefer_lowest_concurrency() {
        let session = Session::new(
            meta(vec![1, 10, 100]),
            vec![ok("A", 100, 500.0, 0), ok("A", 10, 500.0, 0), ok("A", 1, 200.0, 0)],
        );
        let a = Aggregator::new(&session).layer_summary(&LayerId::new("A"), "A");
        assert_eq!(a.best_concurrency, Some(10));
        assert_eq!(a.worst_concurrency, Some(1));
        assert!(!a.degrading);
    }

    #[test]
    fn test_unusable_records_stay_out_of_series() {
        let params = RunParams::new("s", LayerId::new("A"), "", 100, 1000, "url").unwrap();
        let failed_run = RunRecord::new(
            params,
            RunMetrics {
                requests_per_second: Metric::Available(10.0),
                failed_requests: Metric::Available(0),
                ..Default::default()
            },
            RunStatus::failed("timeout"),
        );
        let session = Session::new(
            meta(vec![1, 10, 100]),
            vec![
                ok("A", 1, 300.0, 0),
                record("A", 10, 1000, Metric::Unavailable, Metric::Available(0)),
                failed_run,
            ],
        );
        let summary = Aggregator::new(&session).summarize();
        let a = summary.layer(&LayerId::new("A")).unwrap();

        assert_eq!(a.series, vec![(1, 300.0)]);
        assert_eq!(a.records, 3);
        assert!(!a.degrading);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_highest_successful_concurrency() {
        let session = Session::new(
            meta(vec![1, 10, 100]),
            vec![ok("A", 1, 300.0, 0), ok("A", 10, 350.0, 0), ok("A", 100, 320.0, 4)],
        );
        let a = Aggregator::new(&session).layer_summary(&LayerId::new("A"), "A");
        assert_eq!(a.highest_successful_concurrency, Some(10));
        assert_eq!(a.failure_rate(), Metric::Available(0.13));
    }

    #[test]
    fn test_layer_without_records() {
        let session = Session::new(meta(vec![1]), vec![ok("A", 1, 300.0, 0)]);
        let summary = Aggregator::new(&session).summarize();
        let b = summary.layer(&LayerId::new("B")).unwrap();

        assert!(!b.has_data());
        assert_eq!(b.mean_rps, Metric::Unavailable);
        assert_eq!(b.best_concurrency, None);
        assert_eq!(b.failure_rate(), Metric::Unavailable);
        assert_eq!(b.title, "B");
    }

    fn timed(layer: &str, concurrency: u32, rps: f64, failed: u64, mean_ms: f64) -> RunRecord {
        let params =
            RunParams::new("20241114_123000", LayerId::new(layer), "", concurrency, 1000, "url").unwrap();
        let metrics = RunMetrics {
            requests_per_second: Metric::Available(rps),
            mean_response_time_ms: Metric::Available(mean_ms),
            failed_requests: Metric::Available(failed),
            ..Default::default()
        };
        RunRecord::new(params, metrics, RunStatus::Completed)
    }

    fn advice(records: Vec<RunRecord>) -> Vec<Recommendation> {
        Aggregator::new(&Session::new(meta(vec![1, 10]), records))
            .summarize()
            .recommendations()
    }

    fn thresholds(advice: &[Recommendation]) -> Vec<&Recommendation> {
        advice
            .iter()
            .filter(|r| {
                !matches!(
                    r,
                    Recommendation::BestLayer { .. } | Recommendation::WorstLayer { .. }
                )
            })
            .collect()
    }

    #[test]
    fn test_healthy_session_only_ranks_layers() {
        let advice = advice(vec![
            timed("A", 1, 500.0, 0, 20.0),
            timed("A", 10, 700.0, 0, 30.0),
            timed("B", 1, 200.0, 0, 40.0),
        ]);
        assert_eq!(
            advice,
            vec![
                Recommendation::BestLayer {
                    layer: LayerId::new("A"),
                    title: "Layer A".to_string(),
                    mean_rps: 600.0,
                },
                Recommendation::WorstLayer {
                    layer: LayerId::new("B"),
                    title: "B".to_string(),
                    mean_rps: 200.0,
                },
            ]
        );
        assert_eq!(
            advice[0].to_string(),
            "Best performing layer: Layer A (A) at 600.0 RPS average"
        );
        assert_eq!(
            advice[1].to_string(),
            "Investigate optimization opportunities for: B at 200.0 RPS average"
        );
    }

    #[test]
    fn test_low_success_rate_threshold() {
        // 50 of 1000 failed is exactly 95%
        assert!(thresholds(&advice(vec![timed("A", 1, 500.0, 50, 20.0)])).is_empty());

        let advice = advice(vec![timed("A", 1, 500.0, 60, 20.0)]);
        assert_eq!(
            thresholds(&advice),
            vec![&Recommendation::LowSuccessRate { success_rate: 94.0 }]
        );
        assert!(advice[0].to_string().contains("reducing concurrency"));
    }

    #[test]
    fn test_high_response_time_threshold() {
        assert!(thresholds(&advice(vec![timed("A", 1, 500.0, 0, 1000.0)])).is_empty());

        let advice = advice(vec![timed("A", 1, 500.0, 0, 900.0), timed("A", 10, 500.0, 0, 1200.0)]);
        assert_eq!(
            thresholds(&advice),
            vec![&Recommendation::HighResponseTime { mean_ms: 1050.0 }]
        );
        assert!(advice[0].to_string().contains("server capacity"));
    }

    #[test]
    fn test_low_throughput_threshold() {
        assert!(thresholds(&advice(vec![timed("A", 1, 10.0, 0, 20.0)])).is_empty());

        let advice = advice(vec![timed("A", 1, 9.5, 0, 20.0)]);
        assert_eq!(
            thresholds(&advice),
            vec![&Recommendation::LowThroughput { mean_rps: 9.5 }]
        );
        assert!(advice[0].to_string().contains("optimizing the server configuration"));
    }

    #[test]
    fn test_worst_layer_needs_a_distinct_layer() {
        let single = advice(vec![timed("A", 1, 500.0, 0, 20.0)]);
        assert!(matches!(single.as_slice(), [Recommendation::BestLayer { .. }]));

        let tied = advice(vec![timed("A", 1, 300.0, 0, 20.0), timed("B", 1, 300.0, 0, 20.0)]);
        assert!(matches!(
            tied.as_slice(),
            [Recommendation::BestLayer { layer, .. }] if layer.as_str() == "A"
        ));
    }

    #[test]
    fn test_no_usable_records_no_advice() {
        let params = RunParams::new("s", LayerId::new("A"), "", 1, 1000, "url").unwrap();
        let failed_run = RunRecord::new(params, RunMetrics::default(), RunStatus::failed("timeout"));
        let session = Session::new(meta(vec![1]), vec![failed_run]);
        let summary = Aggregator::new(&session).summarize();

        assert_eq!(summary.mean_rps, Metric::Unavailable);
        assert_eq!(summary.mean_success_rate, Metric::Unavailable);
        assert!(summary.recommendations().is_empty());
    }
}
