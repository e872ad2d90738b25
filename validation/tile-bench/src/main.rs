//! Tile benchmark CLI for GeoServer WMTS endpoints.

use anyhow::Context;
use bench_common::{BenchError, LayerId, RunParams};
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tile_bench::archive::LATEST;
use tile_bench::capabilities::{fetch_layers, fill_descriptions};
use tile_bench::config::{OutputConfig, TileConfig};
use tile_bench::{
    console_summary, parse_run, Aggregator, ApacheBench, HttpProbe, LoadOutput, ReportFormat,
    ReportRenderer, ResultsArchive, SuiteConfig, SuiteRunner, TileUrlBuilder,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tile-bench")]
#[command(about = "WMTS tile benchmarking driven by Apache Bench", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Directory holding session documents and raw logs
    #[arg(long, global = true, env = "TILE_BENCH_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    /// Directory receiving rendered reports
    #[arg(long, global = true, env = "TILE_BENCH_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark suite from a YAML file
    Run {
        /// Path to suite YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the GeoServer base URL
        #[arg(long, env = "TILE_BENCH_SERVER")]
        server: Option<String>,

        /// Override requests per test
        #[arg(short = 'n', long)]
        requests: Option<u64>,

        /// Override concurrency levels, e.g. 1,10,100
        #[arg(short, long, value_delimiter = ',')]
        concurrency: Option<Vec<u32>>,

        /// Report format
        #[arg(short, long, value_enum)]
        format: Option<ReportFormat>,

        /// Skip the per-layer reachability check
        #[arg(long)]
        no_precheck: bool,
    },

    /// Render the report of a persisted session
    Report {
        /// Session id, or "latest"
        #[arg(default_value = LATEST)]
        session: String,

        /// Report format
        #[arg(short, long, value_enum, default_value_t)]
        format: ReportFormat,

        /// Suite YAML to take output directories from
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Parse one captured Apache Bench output into a run record
    Parse {
        /// File containing ab's standard output
        log: PathBuf,

        #[arg(long)]
        layer: String,

        #[arg(short, long)]
        concurrency: u32,

        #[arg(short = 'n', long)]
        requests: u64,

        /// Exit status of the ab invocation
        #[arg(long, default_value_t = 0)]
        exit_code: i32,

        /// Timing file written by `ab -g`
        #[arg(long)]
        timing: Option<PathBuf>,

        /// Session id used in the test id
        #[arg(long, default_value = "adhoc")]
        session: String,
    },

    /// List persisted sessions, newest first
    Sessions {
        /// Suite YAML to take output directories from
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the layers a WMTS endpoint advertises
    Layers {
        /// GeoServer base URL
        #[arg(long, env = "TILE_BENCH_SERVER")]
        server: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, cli.log_json) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        let code = e
            .downcast_ref::<BenchError>()
            .map(BenchError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {:#}", e);
        std::process::exit(code);
    }
}

fn init_tracing(log_level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Logs go to stderr; stdout carries tables and reports.
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let dirs = DirOverrides {
        results: cli.results_dir,
        reports: cli.reports_dir,
    };

    match cli.command {
        Commands::Run {
            config,
            server,
            requests,
            concurrency,
            format,
            no_precheck,
        } => {
            let mut config = SuiteConfig::from_file(&config)
                .with_context(|| format!("loading suite config {}", config.display()))?;

            // Apply overrides
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(n) = requests {
                config.total_requests = n;
            }
            if let Some(levels) = concurrency {
                config.concurrency_levels = levels;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if no_precheck {
                config.precheck = false;
            }
            dirs.apply(&mut config.output);

            if config.discover_descriptions {
                discover_descriptions(&mut config).await;
            }
            config
                .validate()
                .map_err(|e| BenchError::InvalidConfig(e.to_string()))?;

            info!(
                name = %config.name,
                server = %config.server_url,
                layers = config.layers.len(),
                "Configuration loaded"
            );

            let archive = ResultsArchive::new(&config.output.results_dir, &config.output.reports_dir)?;
            let generator = Arc::new(ApacheBench::from_config(&config.load_generator));
            let probe = Arc::new(HttpProbe::new(&config.load_generator.user_agent)?);
            let format = config.output.format;

            let runner = SuiteRunner::new(config, generator, archive.clone())?.with_probe(probe);
            let session = runner.run().await?;

            let saved = archive.save_session(&session)?;
            let report = ReportRenderer::new(format).write(&session, archive.reports_dir())?;

            let view = Aggregator::new(&session).summarize();
            println!("{}", console_summary(&session, &view));
            println!("Results: {}", saved.display());
            println!("Report:  {}", report.display());
            Ok(())
        }

        Commands::Report {
            session,
            format,
            config,
        } => {
            let archive = archive_for(config.as_deref(), &dirs)?;
            let session = archive.load_session(&session)?;
            let report = ReportRenderer::new(format).write(&session, archive.reports_dir())?;

            let view = Aggregator::new(&session).summarize();
            println!("{}", console_summary(&session, &view));
            println!("Report: {}", report.display());
            Ok(())
        }

        Commands::Parse {
            log,
            layer,
            concurrency,
            requests,
            exit_code,
            timing,
            session,
        } => {
            let stdout = std::fs::read_to_string(&log)
                .with_context(|| format!("reading {}", log.display()))?;
            let timing = match timing {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };

            let params = RunParams::new(&session, LayerId::new(layer), "", concurrency, requests, "")?;
            let output = LoadOutput {
                exit_code: Some(exit_code),
                stdout,
                ..Default::default()
            }
            .with_timing_data(timing);

            let record = parse_run(params, &output);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }

        Commands::Sessions { config } => {
            let archive = archive_for(config.as_deref(), &dirs)?;
            let ids = archive.list_sessions()?;
            if ids.is_empty() {
                println!("No sessions in {}", archive.results_dir().display());
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Session", "Suite", "Server", "Tests"]);
            for id in ids {
                match archive.load_session(&id) {
                    Ok(session) => table.add_row(vec![
                        id,
                        session.meta().name.clone(),
                        session.meta().server.clone(),
                        session.total_tests().to_string(),
                    ]),
                    Err(e) => {
                        warn!(session = %id, "Unreadable session: {}", e);
                        table.add_row(vec![id, "(unreadable)".to_string(), String::new(), String::new()])
                    }
                };
            }
            println!("{}", table);
            Ok(())
        }

        Commands::Layers { server } => {
            let urls = TileUrlBuilder::new(&server, TileConfig::default());
            let client = reqwest::Client::builder()
                .user_agent(tile_bench::config::LoadGeneratorConfig::default().user_agent)
                .build()?;
            let layers = fetch_layers(&client, &urls.capabilities_url()).await?;

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Identifier", "Title"]);
            for layer in layers {
                table.add_row(vec![layer.identifier, layer.title]);
            }
            println!("{}", table);
            Ok(())
        }
    }
}

/// Output directories given on the command line or through the environment.
struct DirOverrides {
    results: Option<PathBuf>,
    reports: Option<PathBuf>,
}

impl DirOverrides {
    fn apply(&self, output: &mut OutputConfig) {
        if let Some(dir) = &self.results {
            output.results_dir = dir.clone();
        }
        if let Some(dir) = &self.reports {
            output.reports_dir = dir.clone();
        }
    }
}

fn archive_for(config: Option<&Path>, dirs: &DirOverrides) -> anyhow::Result<ResultsArchive> {
    let mut output = match config {
        Some(path) => SuiteConfig::from_file(path)
            .with_context(|| format!("loading suite config {}", path.display()))?
            .output,
        None => OutputConfig::default(),
    };
    dirs.apply(&mut output);
    Ok(ResultsArchive::new(output.results_dir, output.reports_dir)?)
}

async fn discover_descriptions(config: &mut SuiteConfig) {
    let urls = TileUrlBuilder::new(&config.server_url, config.tile.clone());
    let client = match reqwest::Client::builder()
        .user_agent(config.load_generator.user_agent.clone())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Could not build HTTP client for layer discovery: {}", e);
            return;
        }
    };
    match fetch_layers(&client, &urls.capabilities_url()).await {
        Ok(discovered) => {
            let filled = fill_descriptions(&mut config.layers, &discovered);
            info!(filled = filled, "Filled layer descriptions from capabilities");
        }
        Err(e) => warn!("Layer discovery failed, keeping configured descriptions: {}", e),
    }
}
