//! Captured load-generator output and scratch directories for tests.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Environment variable naming a directory of captured `ab` runs.
pub const CAPTURES_ENV: &str = "TILE_BENCH_CAPTURES";

/// Workspace root, two levels above this crate.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

/// Locate a captured run, looking in `$TILE_BENCH_CAPTURES` and then in
/// the workspace `testdata/` directory.
pub fn find_capture(name: &str) -> Option<PathBuf> {
    std::env::var_os(CAPTURES_ENV)
        .map(PathBuf::from)
        .into_iter()
        .chain(std::iter::once(workspace_root().join("testdata")))
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Contents of a captured run, if one is present and readable.
pub fn read_capture(name: &str) -> Option<String> {
    find_capture(name).and_then(|path| std::fs::read_to_string(path).ok())
}

/// Separate results and reports directories under one temporary root.
///
/// Both directories are removed when the value is dropped. Neither exists
/// up front, so code under test has to create them.
pub struct BenchDirs {
    root: TempDir,
    pub results: PathBuf,
    pub reports: PathBuf,
}

impl BenchDirs {
    pub fn root(&self) -> &Path {
        self.root.path()
    }
}

/// Fresh [`BenchDirs`] for one test.
pub fn bench_dirs() -> BenchDirs {
    let root = tempfile::Builder::new()
        .prefix("tile_bench_")
        .tempdir()
        .expect("Failed to create temporary test directory");
    BenchDirs {
        results: root.path().join("results"),
        reports: root.path().join("reports"),
        root,
    }
}
