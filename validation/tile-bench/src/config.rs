//! Suite configuration loading and management.

use crate::report::ReportFormat;
use bench_common::{LayerCatalog, LayerSpec, TileCoord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Concurrency levels used for incremental testing when none are configured.
pub const DEFAULT_CONCURRENCY_LEVELS: [u32; 9] = [1, 10, 100, 500, 1000, 2000, 3000, 4000, 5000];

/// Requests issued per (layer, concurrency) run when not configured.
pub const DEFAULT_TOTAL_REQUESTS: u64 = 5000;

const QUADTREE_MATRIX_SET: &str = "WebMercatorQuad";

/// Main suite configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// GeoServer base URL, e.g. `https://example.org/geoserver`
    pub server_url: String,
    #[serde(default = "default_total_requests")]
    pub total_requests: u64,
    #[serde(default = "default_concurrency_levels")]
    pub concurrency_levels: Vec<u32>,
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub tile: TileConfig,
    #[serde(default)]
    pub load_generator: LoadGeneratorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Fetch one tile per layer before load testing it
    #[serde(default = "default_true")]
    pub precheck: bool,
    /// Fill empty layer descriptions from the server's capabilities document
    #[serde(default)]
    pub discover_descriptions: bool,
}

/// Layer configuration for testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style: Option<String>,
}

/// Which tile every request fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(default = "default_matrix_set")]
    pub matrix_set: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_zoom")]
    pub zoom: u32,
    #[serde(default = "default_row")]
    pub row: u32,
    #[serde(default = "default_col")]
    pub col: u32,
}

/// How the external load generator is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadGeneratorConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Additional `Name: value` headers
    #[serde(default)]
    pub extra_headers: Vec<String>,
    #[serde(default)]
    pub keep_alive: bool,
    /// Ask ab for a per-request timing file (`-g`)
    #[serde(default = "default_true")]
    pub timing_file: bool,
}

/// Where results and reports are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default)]
    pub format: ReportFormat,
}

fn default_total_requests() -> u64 {
    DEFAULT_TOTAL_REQUESTS
}

fn default_concurrency_levels() -> Vec<u32> {
    DEFAULT_CONCURRENCY_LEVELS.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_matrix_set() -> String {
    QUADTREE_MATRIX_SET.to_string()
}

fn default_format() -> String {
    "image/png".to_string()
}

fn default_zoom() -> u32 {
    TileCoord::default().z
}

fn default_row() -> u32 {
    TileCoord::default().y
}

fn default_col() -> u32 {
    TileCoord::default().x
}

fn default_binary() -> String {
    "ab".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    "GSH-Benchmarker/1.0".to_string()
}

fn default_accept() -> String {
    "image/png,*/*".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            matrix_set: default_matrix_set(),
            format: default_format(),
            zoom: default_zoom(),
            row: default_row(),
            col: default_col(),
        }
    }
}

impl TileConfig {
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.zoom, self.col, self.row)
    }
}

impl Default for LoadGeneratorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            extra_headers: Vec::new(),
            keep_alive: false,
            timing_file: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            reports_dir: default_reports_dir(),
            format: ReportFormat::default(),
        }
    }
}

impl SuiteConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: SuiteConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_url.trim().is_empty() {
            anyhow::bail!("server_url must be set");
        }
        if self.total_requests == 0 {
            anyhow::bail!("total_requests must be > 0");
        }
        if self.concurrency_levels.is_empty() {
            anyhow::bail!("at least one concurrency level must be specified");
        }
        for (i, level) in self.concurrency_levels.iter().enumerate() {
            if *level == 0 {
                anyhow::bail!("concurrency levels must be > 0");
            }
            if self.concurrency_levels[..i].contains(level) {
                anyhow::bail!("concurrency level {} is listed more than once", level);
            }
            // ab refuses a concurrency above the request count
            if u64::from(*level) > self.total_requests {
                anyhow::bail!(
                    "concurrency level {} exceeds total_requests {}",
                    level,
                    self.total_requests
                );
            }
        }
        if self.layers.is_empty() {
            anyhow::bail!("at least one layer must be specified");
        }
        if self.tile.matrix_set == QUADTREE_MATRIX_SET && !self.tile.coord().is_within_quadtree() {
            anyhow::bail!(
                "tile {}/{}/{} lies outside {}",
                self.tile.zoom,
                self.tile.col,
                self.tile.row,
                QUADTREE_MATRIX_SET
            );
        }
        if self.load_generator.timeout_secs == 0 {
            anyhow::bail!("load_generator.timeout_secs must be > 0");
        }
        if self.output.results_dir == self.output.reports_dir {
            anyhow::bail!("results_dir and reports_dir must be different directories");
        }
        self.catalog()?;
        Ok(())
    }

    /// Immutable layer catalog in configured order.
    pub fn catalog(&self) -> anyhow::Result<LayerCatalog> {
        let catalog = LayerCatalog::new(
            self.layers
                .iter()
                .map(|l| LayerSpec::new(l.name.clone(), l.description.clone())),
        )?;
        Ok(catalog)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Host part of the server URL, used to identify the target in reports.
    pub fn server_identifier(&self) -> String {
        server_identifier(&self.server_url)
    }
}

/// Strip scheme, credentials and path from a URL.
pub fn server_identifier(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    host.to_string()
}
