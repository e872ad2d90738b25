//! Common types shared across the tile-bench workspace.

pub mod error;
pub mod layer;
pub mod metric;
pub mod record;
pub mod session;
pub mod tile;

pub use error::{BenchError, BenchResult};
pub use layer::{LayerCatalog, LayerId, LayerSpec};
pub use metric::{Metric, NOT_AVAILABLE, UNAVAILABLE};
pub use record::{round_to, success_rate, LatencyProfile, RunMetrics, RunParams, RunRecord, RunStatus};
pub use session::{IntegrityIssue, Session, SessionMeta, SESSION_ID_FORMAT};
pub use tile::TileCoord;
