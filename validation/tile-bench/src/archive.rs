//! On-disk layout of results and reports.

use crate::report::{report_path, ReportFormat};
use bench_common::{BenchError, BenchResult, Session};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SESSION_PREFIX: &str = "consolidated_results_";
const SESSION_SUFFIX: &str = ".json";
const CLAIM_SUFFIX: &str = ".claim";

/// Upper bound on `_NN` suffixes tried for one base id.
const MAX_ID_SUFFIX: u32 = 99;

/// Selects the newest session in `load_session`.
pub const LATEST: &str = "latest";

/// Results and reports directories of one installation.
#[derive(Debug, Clone)]
pub struct ResultsArchive {
    results_dir: PathBuf,
    reports_dir: PathBuf,
}

impl ResultsArchive {
    pub fn new(results_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> BenchResult<Self> {
        let results_dir = results_dir.into();
        let reports_dir = reports_dir.into();
        if results_dir == reports_dir {
            return Err(BenchError::InvalidConfig(format!(
                "results and reports directories must differ ({})",
                results_dir.display()
            )));
        }
        Ok(Self {
            results_dir,
            reports_dir,
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn session_path(&self, id: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}{}{}", SESSION_PREFIX, id, SESSION_SUFFIX))
    }

    pub fn report_path(&self, id: &str, format: ReportFormat) -> PathBuf {
        report_path(&self.reports_dir, id, format)
    }

    fn claim_path(&self, id: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}{}{}", SESSION_PREFIX, id, CLAIM_SUFFIX))
    }

    /// Reserve a session id that no saved or running session uses.
    ///
    /// `base` is taken when free, otherwise `base_02`, `base_03` and so on.
    /// The reservation is a marker file created with `create_new`, so two
    /// processes starting in the same second never get the same id.
    pub fn claim_session_id(&self, base: &str) -> BenchResult<String> {
        fs::create_dir_all(&self.results_dir)?;
        let candidates = std::iter::once(base.to_string())
            .chain((2..=MAX_ID_SUFFIX).map(|n| format!("{}_{:02}", base, n)));
        for id in candidates {
            if self.session_path(&id).exists() {
                continue;
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.claim_path(&id))
            {
                Ok(_) => {
                    debug!(session = %id, "Session id claimed");
                    return Ok(id);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(BenchError::SessionExists(format!(
            "{} (and {} suffixed ids)",
            base,
            MAX_ID_SUFFIX - 1
        )))
    }

    /// Persist the session document. Readers never observe a partial file
    /// and an existing session is never replaced.
    pub fn save_session(&self, session: &Session) -> BenchResult<PathBuf> {
        fs::create_dir_all(&self.results_dir)?;
        let path = self.session_path(session.id());
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, session.to_json()?)?;
        // a hard link fails instead of clobbering an existing target
        let linked = fs::hard_link(&tmp, &path);
        fs::remove_file(&tmp)?;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BenchError::SessionExists(session.id().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(self.claim_path(session.id())) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!(session = %session.id(), "Could not release session id claim: {}", e);
            }
            _ => {}
        }
        info!(session = %session.id(), path = %path.display(), "Session saved");
        Ok(path)
    }

    /// Load a session by id, or the newest one for `latest`.
    pub fn load_session(&self, id: &str) -> BenchResult<Session> {
        let id = if id == LATEST {
            self.list_sessions()?
                .into_iter()
                .next()
                .ok_or_else(|| BenchError::SessionNotFound(LATEST.to_string()))?
        } else {
            id.to_string()
        };

        let path = self.session_path(&id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BenchError::SessionNotFound(id));
            }
            Err(e) => {
                return Err(BenchError::SessionCorrupt {
                    id,
                    message: e.to_string(),
                })
            }
        };
        debug!(session = %id, path = %path.display(), "Loading session");
        Session::from_json(&id, &json)
    }

    /// Ids of persisted sessions, newest first.
    pub fn list_sessions(&self) -> BenchResult<Vec<String>> {
        let entries = match fs::read_dir(&self.results_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name
                .strip_prefix(SESSION_PREFIX)
                .and_then(|rest| rest.strip_suffix(SESSION_SUFFIX))
            {
                ids.push(id.to_string());
            }
        }
        // default ids are timestamps, so lexical order is chronological
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Store raw load generator output as `<test_id>.log`.
    pub fn write_raw_log(&self, test_id: &str, stdout: &str, stderr: &str) -> BenchResult<PathBuf> {
        fs::create_dir_all(&self.results_dir)?;
        let path = self.results_dir.join(format!("{}.log", test_id));
        let mut content = stdout.to_string();
        if !stderr.is_empty() {
            content.push_str("\n--- STDERR ---\n");
            content.push_str(stderr);
        }
        fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_common::{LayerCatalog, LayerSpec, SessionMeta};
    use chrono::Utc;
    use tempfile::TempDir;

    fn archive(dir: &TempDir) -> ResultsArchive {
        ResultsArchive::new(dir.path().join("results"), dir.path().join("reports")).unwrap()
    }

    fn session(id: &str) -> Session {
        let meta = SessionMeta {
            id: id.to_string(),
            name: "suite".to_string(),
            server: "localhost".to_string(),
            created_at: Utc::now(),
            total_requests_per_test: 100,
            concurrency_levels: vec![1],
            layers: LayerCatalog::new([LayerSpec::new("A", "")]).unwrap(),
        };
        Session::new(meta, Vec::new())
    }

    #[test]
    fn test_rejects_shared_directory() {
        assert!(matches!(
            ResultsArchive::new("out", "out"),
            Err(BenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        archive.save_session(&session("20241114_120000")).unwrap();
        let path = archive.save_session(&session("20241115_080000")).unwrap();

        assert!(path.ends_with("consolidated_results_20241115_080000.json"));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(
            archive.list_sessions().unwrap(),
            vec!["20241115_080000", "20241114_120000"]
        );
        assert_eq!(archive.load_session(LATEST).unwrap().id(), "20241115_080000");
        assert_eq!(archive.load_session("20241114_120000").unwrap().id(), "20241114_120000");
    }

    #[test]
    fn test_existing_session_is_not_replaced() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let path = archive.save_session(&session("20241114_120000")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let original = session("20241114_120000");
        let other = Session::new(
            SessionMeta {
                name: "other suite".to_string(),
                ..original.meta().clone()
            },
            Vec::new(),
        );
        let err = archive.save_session(&other).unwrap_err();
        assert!(matches!(err, BenchError::SessionExists(ref id) if id == "20241114_120000"));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_claimed_ids_are_distinct() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let first = archive.claim_session_id("20241114_120000").unwrap();
        let second = archive.claim_session_id("20241114_120000").unwrap();
        assert_eq!(first, "20241114_120000");
        assert_eq!(second, "20241114_120000_02");

        // claim markers are not sessions, and saving releases the claim
        assert!(archive.list_sessions().unwrap().is_empty());
        archive.save_session(&session(&first)).unwrap();
        assert!(!archive.claim_path(&first).exists());
        assert_eq!(archive.list_sessions().unwrap(), vec!["20241114_120000"]);
        assert_eq!(
            archive.claim_session_id("20241114_120000").unwrap(),
            "20241114_120000_03"
        );
    }

    #[test]
    fn test_missing_session() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let err = archive.load_session("20200101_000000").unwrap_err();
        assert!(matches!(err, BenchError::SessionNotFound(ref id) if id == "20200101_000000"));
        assert!(matches!(
            archive.load_session(LATEST),
            Err(BenchError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_session() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        fs::create_dir_all(archive.results_dir()).unwrap();
        fs::write(archive.session_path("broken"), "{\"test_suite\": ").unwrap();

        let err = archive.load_session("broken").unwrap_err();
        assert!(matches!(err, BenchError::SessionCorrupt { ref id, .. } if id == "broken"));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_raw_log_appends_stderr() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let path = archive.write_raw_log("bkb_2024_c10_x", "out", "err").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "out\n--- STDERR ---\nerr");

        let path = archive.write_raw_log("bkb_2024_c1_x", "out", "").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "out");
    }
}
