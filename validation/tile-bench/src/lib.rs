//! WMTS tile benchmarking on top of Apache Bench.
//!
//! This crate provides tools to:
//! - Generate WMTS GetTile URLs for configured layers
//! - Drive `ab` across layers and concurrency levels
//! - Normalize its output into run records and sessions
//! - Aggregate sessions and render HTML, Markdown or text reports

pub mod aggregate;
pub mod archive;
pub mod capabilities;
pub mod chart;
pub mod config;
pub mod generator;
pub mod metrics;
pub mod parser;
pub mod report;
pub mod runner;
pub mod store;

pub use aggregate::{Aggregator, LayerSummary, Recommendation, SummaryView};
pub use archive::ResultsArchive;
pub use config::{LayerConfig, SuiteConfig};
pub use generator::TileUrlBuilder;
pub use parser::{parse_metrics, parse_run, LoadOutput};
pub use report::{console_summary, ReportFormat, ReportRenderer};
pub use runner::{ApacheBench, HttpProbe, LoadGenerator, LoadRequest, Probe, SuiteRunner};
pub use store::{ResultStore, SharedResultStore};
