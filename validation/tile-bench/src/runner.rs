//! Load generator invocation and suite orchestration.

use crate::archive::ResultsArchive;
use crate::config::{LoadGeneratorConfig, SuiteConfig};
use crate::generator::TileUrlBuilder;
use crate::parser::{parse_run, LoadOutput};
use crate::store::ResultStore;
use anyhow::Context;
use async_trait::async_trait;
use bench_common::{LayerCatalog, LayerId, RunParams, Session, SessionMeta};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Timeout of the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// One load generator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub url: String,
    pub total_requests: u64,
    pub concurrency: u32,
    /// Where the per-request timing file should be written
    pub timing_path: Option<PathBuf>,
}

/// Something that can put load on a URL and report the raw outcome.
///
/// Implementations never fail: a generator that cannot start, crashes or
/// times out reports that through the returned `LoadOutput`.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    async fn run(&self, request: &LoadRequest) -> LoadOutput;
}

/// Apache Bench (`ab`) as an external process.
#[derive(Debug, Clone)]
pub struct ApacheBench {
    binary: String,
    timeout: Duration,
    headers: Vec<String>,
    keep_alive: bool,
}

impl ApacheBench {
    pub fn from_config(config: &LoadGeneratorConfig) -> Self {
        let mut headers = vec![
            format!("User-Agent: {}", config.user_agent),
            format!("Accept: {}", config.accept),
        ];
        headers.extend(config.extra_headers.iter().cloned());
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            headers,
            keep_alive: config.keep_alive,
        }
    }

    /// Command line arguments for one invocation.
    pub fn args(&self, request: &LoadRequest) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            request.total_requests.to_string(),
            "-c".to_string(),
            request.concurrency.to_string(),
        ];
        if self.keep_alive {
            args.push("-k".to_string());
        }
        if let Some(path) = &request.timing_path {
            args.push("-g".to_string());
            args.push(path.display().to_string());
        }
        for header in &self.headers {
            args.push("-H".to_string());
            args.push(header.clone());
        }
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl LoadGenerator for ApacheBench {
    async fn run(&self, request: &LoadRequest) -> LoadOutput {
        let args = self.args(request);
        debug!(binary = %self.binary, args = ?args, "Spawning load generator");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return LoadOutput::not_started(format!("failed to start {}: {}", self.binary, e)),
        };

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return LoadOutput::not_started(format!("failed to wait for {}: {}", self.binary, e)),
            Err(_) => {
                warn!(
                    url = %request.url,
                    concurrency = request.concurrency,
                    timeout_secs = self.timeout.as_secs(),
                    "Load generator timed out"
                );
                return LoadOutput::timed_out();
            }
        };

        let timing_data = match &request.timing_path {
            Some(path) => tokio::fs::read_to_string(path).await.ok(),
            None => None,
        };

        LoadOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
            timing_data,
        }
    }
}

/// Checks that a tile URL is served before it is load tested.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Err` carries the reason the URL is considered unreachable.
    async fn check(&self, url: &str) -> anyhow::Result<()>;
}

/// Single GET request; only HTTP 200 counts as reachable.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> anyhow::Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("HTTP {}", status.as_u16());
        }
        Ok(())
    }
}

/// Runs every configured (layer, concurrency) pair once, strictly in sequence.
pub struct SuiteRunner {
    config: SuiteConfig,
    catalog: LayerCatalog,
    urls: TileUrlBuilder,
    generator: Arc<dyn LoadGenerator>,
    probe: Option<Arc<dyn Probe>>,
    archive: ResultsArchive,
    session_id: Option<String>,
    show_progress: bool,
}

impl SuiteRunner {
    pub fn new(
        config: SuiteConfig,
        generator: Arc<dyn LoadGenerator>,
        archive: ResultsArchive,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let catalog = config.catalog()?;
        let urls = TileUrlBuilder::new(&config.server_url, config.tile.clone());
        Ok(Self {
            config,
            catalog,
            urls,
            generator,
            probe: None,
            archive,
            session_id: None,
            show_progress: true,
        })
    }

    /// Probe each layer before testing it (when enabled in the config).
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Use a fixed session id instead of one derived from the start time.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn progress_bar(&self, total: u64) -> anyhow::Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} runs {msg}")?
                .progress_chars("##-"),
        );
        Ok(pb)
    }

    /// Execute the suite and freeze the collected records into a session.
    pub async fn run(&self) -> anyhow::Result<Session> {
        let created_at = Utc::now();
        let id = match &self.session_id {
            Some(id) => id.clone(),
            None => self
                .archive
                .claim_session_id(&SessionMeta::id_for(created_at))
                .context("claiming a session id")?,
        };
        let levels = self.config.concurrency_levels.clone();
        let meta = SessionMeta {
            id: id.clone(),
            name: self.config.name.clone(),
            server: self.config.server_identifier(),
            created_at,
            total_requests_per_test: self.config.total_requests,
            concurrency_levels: levels.clone(),
            layers: self.catalog.clone(),
        };
        let mut store = ResultStore::new(meta);

        info!(
            session = %id,
            layers = self.catalog.len(),
            levels = ?levels,
            requests = self.config.total_requests,
            "Starting benchmark suite"
        );

        // ab writes its timing file here before any raw log exists
        std::fs::create_dir_all(self.archive.results_dir()).with_context(|| {
            format!("creating results directory {}", self.archive.results_dir().display())
        })?;
        let pb = self.progress_bar((self.catalog.len() * levels.len()) as u64)?;

        for layer in &self.config.layers {
            let layer_id = LayerId::new(layer.name.clone());
            let description = self
                .catalog
                .description_of(&layer_id)
                .unwrap_or_default()
                .to_string();
            let url = self.urls.tile_url(&layer.name, layer.style.as_deref());

            if self.config.precheck {
                if let Some(probe) = &self.probe {
                    if let Err(e) = probe.check(&url).await {
                        warn!(layer = %layer_id, url = %url, "Skipping unreachable layer: {}", e);
                        pb.inc(levels.len() as u64);
                        continue;
                    }
                }
            }

            for &concurrency in &levels {
                pb.set_message(format!("{} c={}", layer_id, concurrency));
                let params = RunParams::new(
                    &id,
                    layer_id.clone(),
                    description.clone(),
                    concurrency,
                    self.config.total_requests,
                    url.clone(),
                )?;
                let request = LoadRequest {
                    url: url.clone(),
                    total_requests: self.config.total_requests,
                    concurrency,
                    timing_path: self
                        .config
                        .load_generator
                        .timing_file
                        .then(|| self.archive.results_dir().join(format!("{}.tsv", params.test_id))),
                };

                let output = self.generator.run(&request).await;
                if let Err(e) = self
                    .archive
                    .write_raw_log(&params.test_id, &output.stdout, &output.stderr)
                {
                    warn!(test_id = %params.test_id, "Could not archive raw output: {}", e);
                }

                let record = parse_run(params, &output);
                if record.is_failed() {
                    warn!(
                        layer = %layer_id,
                        concurrency = concurrency,
                        status = ?record.status(),
                        "Run failed"
                    );
                } else {
                    info!(
                        layer = %layer_id,
                        concurrency = concurrency,
                        rps = %record.requests_per_second(),
                        mean_ms = %record.mean_response_time_ms(),
                        failed = %record.failed_requests(),
                        "Run completed"
                    );
                }
                store.add(record);
                pb.inc(1);
            }
        }

        pb.finish_with_message("done");
        let session = store.into_session();
        info!(session = %id, tests = session.total_tests(), "Benchmark suite finished");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use test_utils::fixtures::ab_output;

    /// Answers every request with synthetic `ab` output and remembers the calls.
    #[derive(Default)]
    struct FakeGenerator {
        calls: Mutex<Vec<LoadRequest>>,
        time_out_at: Option<u32>,
    }

    #[async_trait]
    impl LoadGenerator for FakeGenerator {
        async fn run(&self, request: &LoadRequest) -> LoadOutput {
            self.calls.lock().unwrap().push(request.clone());
            if self.time_out_at == Some(request.concurrency) {
                return LoadOutput::timed_out();
            }
            let rps = 1000.0 / f64::from(request.concurrency);
            LoadOutput::completed(ab_output(request.concurrency, request.total_requests, 0, rps, 5.0, 700.0))
        }
    }

    struct RejectLayer(&'static str);

    #[async_trait]
    impl Probe for RejectLayer {
        async fn check(&self, url: &str) -> anyhow::Result<()> {
            if url.contains(&format!("LAYER={}&", self.0)) {
                anyhow::bail!("HTTP 404");
            }
            Ok(())
        }
    }

    fn config(dir: &TempDir) -> SuiteConfig {
        SuiteConfig::from_yaml_str(&format!(
            r#"
name: unit suite
server_url: http://localhost:8080/geoserver
total_requests: 100
concurrency_levels: [1, 10]
layers:
  - name: A
    description: Layer A
  - name: B
output:
  results_dir: {}/results
  reports_dir: {}/reports
"#,
            dir.path().display(),
            dir.path().display()
        ))
        .unwrap()
    }

    fn runner(dir: &TempDir, generator: Arc<FakeGenerator>) -> SuiteRunner {
        let config = config(dir);
        let archive = ResultsArchive::new(&config.output.results_dir, &config.output.reports_dir).unwrap();
        SuiteRunner::new(config, generator, archive)
            .unwrap()
            .with_session_id("20241114_123000")
            .with_progress(false)
    }

    #[tokio::test]
    async fn test_runs_every_pair_in_order() {
        let dir = TempDir::new().unwrap();
        let generator = Arc::new(FakeGenerator::default());
        let session = runner(&dir, generator.clone()).run().await.unwrap();

        let calls: Vec<(String, u32)> = generator
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.url.clone(), r.concurrency))
            .collect();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].0.contains("LAYER=A&"));
        assert_eq!(calls[1].1, 10);
        assert!(calls[2].0.contains("LAYER=B&"));

        assert_eq!(session.id(), "20241114_123000");
        assert_eq!(session.total_tests(), 4);
        assert!(session.integrity_issues().is_empty());
        assert_eq!(session.records()[0].test_id(), "A_c1_20241114_123000");
        assert_eq!(session.records()[0].description(), "Layer A");
        assert!(dir.path().join("results/A_c1_20241114_123000.log").exists());
    }

    #[tokio::test]
    async fn test_unreachable_layer_is_skipped() {
        let dir = TempDir::new().unwrap();
        let generator = Arc::new(FakeGenerator::default());
        let session = runner(&dir, generator.clone())
            .with_probe(Arc::new(RejectLayer("B")))
            .run()
            .await
            .unwrap();

        assert_eq!(generator.calls.lock().unwrap().len(), 2);
        assert_eq!(session.records_for(&LayerId::new("B")).count(), 0);
        assert_eq!(session.records_for(&LayerId::new("A")).count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_yields_failed_record() {
        let dir = TempDir::new().unwrap();
        let generator = Arc::new(FakeGenerator {
            time_out_at: Some(10),
            ..Default::default()
        });
        let session = runner(&dir, generator).run().await.unwrap();

        let timed_out: Vec<_> = session.records().iter().filter(|r| r.is_failed()).collect();
        assert_eq!(timed_out.len(), 2);
        assert!(timed_out.iter().all(|r| !r.requests_per_second().is_available()));
        assert!(timed_out.iter().all(|r| !r.failed_requests().is_available()));
    }

    #[tokio::test]
    async fn test_concurrent_suites_keep_both_sessions() {
        let dir = TempDir::new().unwrap();
        let suite = || {
            let config = config(&dir);
            let archive =
                ResultsArchive::new(&config.output.results_dir, &config.output.reports_dir).unwrap();
            let runner = SuiteRunner::new(config, Arc::new(FakeGenerator::default()), archive.clone())
                .unwrap()
                .with_progress(false);
            async move {
                let session = runner.run().await.unwrap();
                archive.save_session(&session).unwrap();
                session
            }
        };

        let (first, second) = tokio::join!(suite(), suite());
        assert_ne!(first.id(), second.id());

        let archive = ResultsArchive::new(dir.path().join("results"), dir.path().join("reports")).unwrap();
        let mut saved = archive.list_sessions().unwrap();
        saved.sort();
        let mut expected = vec![first.id().to_string(), second.id().to_string()];
        expected.sort();
        assert_eq!(saved, expected);
        for session in [&first, &second] {
            assert_eq!(archive.load_session(session.id()).unwrap().total_tests(), 4);
            let log = format!("results/A_c1_{}.log", session.id());
            assert!(dir.path().join(log).exists());
        }
    }

    #[test]
    fn test_ab_arguments() {
        let ab = ApacheBench::from_config(&LoadGeneratorConfig {
            extra_headers: vec!["Cache-Control: no-cache".to_string()],
            keep_alive: true,
            ..Default::default()
        });
        let args = ab.args(&LoadRequest {
            url: "http://x/tile".to_string(),
            total_requests: 5000,
            concurrency: 10,
            timing_path: Some(PathBuf::from("results/t.tsv")),
        });
        assert_eq!(
            args,
            vec![
                "-n",
                "5000",
                "-c",
                "10",
                "-k",
                "-g",
                "results/t.tsv",
                "-H",
                "User-Agent: GSH-Benchmarker/1.0",
                "-H",
                "Accept: image/png,*/*",
                "-H",
                "Cache-Control: no-cache",
                "http://x/tile",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_failed_run() {
        let ab = ApacheBench::from_config(&LoadGeneratorConfig {
            binary: "/nonexistent/ab-binary".to_string(),
            ..Default::default()
        });
        let output = ab
            .run(&LoadRequest {
                url: "http://localhost/".to_string(),
                total_requests: 1,
                concurrency: 1,
                timing_path: None,
            })
            .await;
        assert!(output.failure_reason().is_some());
        assert!(output.stdout.is_empty());
    }
}
