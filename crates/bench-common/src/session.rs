//! Benchmark sessions and their persisted document form.

use crate::{BenchError, BenchResult, LayerCatalog, LayerId, RunRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format of generated session identifiers.
pub const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suite-level metadata of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Session identifier, also used to name result and report files
    pub id: String,
    /// Suite name
    pub name: String,
    /// Target server identifier
    pub server: String,
    pub created_at: DateTime<Utc>,
    pub total_requests_per_test: u64,
    /// Configured concurrency levels in execution order
    pub concurrency_levels: Vec<u32>,
    /// Configured layers in execution order
    pub layers: LayerCatalog,
}

impl SessionMeta {
    /// Identifier derived from a creation instant.
    pub fn id_for(created_at: DateTime<Utc>) -> String {
        created_at.format(SESSION_ID_FORMAT).to_string()
    }

    /// Check that a record belongs to this session's configuration.
    pub fn check(&self, record: &RunRecord) -> Option<IntegrityIssue> {
        if !self.layers.contains(record.layer()) {
            return Some(IntegrityIssue::UnconfiguredLayer {
                layer: record.layer().clone(),
                concurrency: record.concurrency(),
            });
        }
        if !self.concurrency_levels.contains(&record.concurrency()) {
            return Some(IntegrityIssue::UnconfiguredConcurrency {
                layer: record.layer().clone(),
                concurrency: record.concurrency(),
            });
        }
        None
    }
}

/// A record that does not fit the session it was submitted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    UnconfiguredLayer { layer: LayerId, concurrency: u32 },
    UnconfiguredConcurrency { layer: LayerId, concurrency: u32 },
    Duplicate { layer: LayerId, concurrency: u32 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::UnconfiguredLayer { layer, concurrency } => write!(
                f,
                "record for layer '{}' (c={}) but the layer is not configured",
                layer, concurrency
            ),
            IntegrityIssue::UnconfiguredConcurrency { layer, concurrency } => write!(
                f,
                "record for layer '{}' at unconfigured concurrency {}",
                layer, concurrency
            ),
            IntegrityIssue::Duplicate { layer, concurrency } => write!(
                f,
                "duplicate record for layer '{}' at concurrency {}; keeping the newer one",
                layer, concurrency
            ),
        }
    }
}

/// One complete test-suite invocation, frozen for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "test_suite")]
    meta: SessionMeta,
    /// Records in execution order
    results: Vec<RunRecord>,
}

impl Session {
    pub fn new(meta: SessionMeta, results: Vec<RunRecord>) -> Self {
        Self { meta, results }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn layers(&self) -> &LayerCatalog {
        &self.meta.layers
    }

    pub fn concurrency_levels(&self) -> &[u32] {
        &self.meta.concurrency_levels
    }

    /// All records in execution order.
    pub fn records(&self) -> &[RunRecord] {
        &self.results
    }

    pub fn total_tests(&self) -> usize {
        self.results.len()
    }

    /// Records of one layer in configured concurrency order. Records at
    /// unconfigured levels follow, in execution order.
    pub fn records_for<'a>(&'a self, layer: &'a LayerId) -> impl Iterator<Item = &'a RunRecord> + 'a {
        let levels = &self.meta.concurrency_levels;
        let configured = levels.iter().filter_map(move |c| {
            self.results
                .iter()
                .rev()
                .find(|r| r.layer() == layer && r.concurrency() == *c)
        });
        let unconfigured = self
            .results
            .iter()
            .filter(move |r| r.layer() == layer && !levels.contains(&r.concurrency()));
        configured.chain(unconfigured)
    }

    /// Records that do not fit the configuration.
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        self.results.iter().filter_map(|r| self.meta.check(r)).collect()
    }

    /// Serialize the complete session as one JSON document.
    pub fn to_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a session document. `id` names the session in error messages.
    pub fn from_json(id: &str, json: &str) -> BenchResult<Self> {
        serde_json::from_str(json).map_err(|e| BenchError::SessionCorrupt {
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LayerSpec, Metric, RunMetrics, RunParams, RunStatus};
    use chrono::TimeZone;

    fn meta() -> SessionMeta {
        let created_at = Utc.with_ymd_and_hms(2024, 11, 14, 12, 30, 0).unwrap();
        SessionMeta {
            id: SessionMeta::id_for(created_at),
            name: "GeoServer Comprehensive Load Test".to_string(),
            server: "climate-adaptation-services.geospatialhosting.com".to_string(),
            created_at,
            total_requests_per_test: 1000,
            concurrency_levels: vec![10, 1],
            layers: LayerCatalog::new([LayerSpec::new("A", "Layer A"), LayerSpec::new("B", "")])
                .unwrap(),
        }
    }

    fn record(layer: &str, concurrency: u32, rps: Metric<f64>, failed: Metric<u64>) -> RunRecord {
        let params = RunParams::new("20241114_123000", LayerId::new(layer), "", concurrency, 1000, "url")
            .unwrap()
            .with_timestamp(Utc.with_ymd_and_hms(2024, 11, 14, 12, 31, 0).unwrap());
        let metrics = RunMetrics {
            requests_per_second: rps,
            failed_requests: failed,
            ..Default::default()
        };
        RunRecord::new(params, metrics, RunStatus::Completed)
    }

    #[test]
    fn test_id_format() {
        assert_eq!(meta().id, "20241114_123000");
    }

    #[test]
    fn test_check_flags_unconfigured() {
        let meta = meta();
        assert_eq!(meta.check(&record("A", 1, Metric::Unavailable, Metric::Unavailable)), None);
        assert!(matches!(
            meta.check(&record("C", 1, Metric::Unavailable, Metric::Unavailable)),
            Some(IntegrityIssue::UnconfiguredLayer { .. })
        ));
        assert!(matches!(
            meta.check(&record("A", 50, Metric::Unavailable, Metric::Unavailable)),
            Some(IntegrityIssue::UnconfiguredConcurrency { concurrency: 50, .. })
        ));
    }

    #[test]
    fn test_records_for_uses_configured_order() {
        let session = Session::new(
            meta(),
            vec![
                record("A", 1, Metric::Available(10.0), Metric::Available(0)),
                record("B", 1, Metric::Available(11.0), Metric::Available(0)),
                record("A", 10, Metric::Available(20.0), Metric::Available(0)),
            ],
        );
        let layer = LayerId::new("A");
        let levels: Vec<u32> = session.records_for(&layer).map(|r| r.concurrency()).collect();
        // configured order is [10, 1]
        assert_eq!(levels, vec![10, 1]);
    }

    #[test]
    fn test_round_trip_preserves_unavailable_markers() {
        let session = Session::new(
            meta(),
            vec![
                record("A", 1, Metric::Available(847.23), Metric::Available(10)),
                record("A", 10, Metric::Unavailable, Metric::Unavailable),
            ],
        );
        let json = session.to_json().unwrap();
        assert!(json.contains("\"unavailable\""));
        let loaded = Session::from_json(session.id(), &json).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.records(), session.records());
    }

    #[test]
    fn test_corrupt_document_names_session() {
        let err = Session::from_json("20241114_123000", "{ not json").unwrap_err();
        match err {
            BenchError::SessionCorrupt { id, .. } => assert_eq!(id, "20241114_123000"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
