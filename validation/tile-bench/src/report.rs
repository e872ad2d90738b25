//! Report rendering and formatting.

use crate::aggregate::{Aggregator, LayerSummary, SummaryView};
use crate::chart::{rps_chart, text_bars, ChartError};
use bench_common::{
    BenchError, BenchResult, LatencyProfile, LayerId, Metric, RunRecord, RunStatus, Session, NOT_AVAILABLE,
};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::ASCII_MARKDOWN, presets::UTF8_FULL, Table};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Output format of the report document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Markdown,
    Text,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Markdown => "md",
            ReportFormat::Text => "txt",
        }
    }
}

/// Why a layer section fell back to its placeholder.
#[derive(Debug, Error, PartialEq)]
pub enum SectionError {
    #[error("no results recorded for layer {0}")]
    NoRecords(LayerId),
}

const TABLE_HEADER: [&str; 8] = [
    "Concurrency",
    "Requests/s",
    "Mean (ms)",
    "p95 (ms)",
    "Failed",
    "Success",
    "Transfer (KB/s)",
    "Status",
];

const PERCENTILE_HEADER: [&str; 7] = [
    "Concurrency",
    "Samples",
    "p50 (ms)",
    "p90 (ms)",
    "p95 (ms)",
    "p99 (ms)",
    "Max (ms)",
];

const NO_DATA: &str = "No data available for this layer.";
const NO_RECOMMENDATIONS: &str = "No recommendations: the session has no usable results.";

/// Columns of the widest throughput bar.
const BAR_WIDTH: usize = 40;

/// One table row, already formatted.
struct ReportRow {
    cells: [String; 8],
}

/// Latency percentiles of one run with a timing file.
struct PercentileRow {
    cells: [String; 7],
}

impl PercentileRow {
    fn new(concurrency: u32, latency: &LatencyProfile) -> Self {
        let ms = |v: f64| format!("{:.2}", v);
        Self {
            cells: [
                concurrency.to_string(),
                latency.samples.to_string(),
                ms(latency.p50_ms),
                ms(latency.p90_ms),
                ms(latency.p95_ms),
                ms(latency.p99_ms),
                ms(latency.max_ms),
            ],
        }
    }
}

impl ReportRow {
    fn from_record(record: &RunRecord) -> Self {
        let p95 = record
            .latency()
            .map(|l| format!("{:.2}", l.p95_ms))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let status = match record.status() {
            RunStatus::Completed => "ok".to_string(),
            RunStatus::Failed { reason } => format!("failed: {}", reason),
        };
        Self {
            cells: [
                record.concurrency().to_string(),
                record.requests_per_second().render(2),
                record.mean_response_time_ms().render(2),
                p95,
                record.failed_requests().render_with(|f| f.to_string()),
                record.success_rate().render_with(|s| format!("{:.2}%", s)),
                record.transfer_rate_kbps().render(2),
                status,
            ],
        }
    }
}

struct LayerSection<'a> {
    summary: &'a LayerSummary,
    url: String,
    rows: Vec<ReportRow>,
    /// Only runs that carry a latency profile.
    percentiles: Vec<PercentileRow>,
    chart: Result<String, ChartError>,
    bars: Result<String, ChartError>,
}

/// Renders a frozen session into a report document.
pub struct ReportRenderer {
    format: ReportFormat,
}

impl ReportRenderer {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Render the complete document.
    ///
    /// Layers that cannot be rendered get a placeholder; only a formatting
    /// failure of the document itself is an error.
    pub fn render(&self, session: &Session) -> BenchResult<String> {
        let view = Aggregator::new(session).summarize();
        let sections: Vec<Result<LayerSection, SectionError>> = view
            .layers
            .iter()
            .map(|summary| layer_section(session, summary))
            .collect();

        for section in &sections {
            if let Err(e) = section {
                warn!(session = %session.id(), "Rendering placeholder: {}", e);
            }
        }

        let mut out = String::new();
        let rendered = match self.format {
            ReportFormat::Html => render_html(&mut out, session, &view, &sections),
            ReportFormat::Markdown => render_markdown(&mut out, session, &view, &sections),
            ReportFormat::Text => render_text(&mut out, session, &view, &sections),
        };
        rendered.map_err(|e| BenchError::ReportWrite(format!("session {}: {}", session.id(), e)))?;
        Ok(out)
    }

    /// Render and write `<reports_dir>/<session_id>_report.<ext>`.
    pub fn write(&self, session: &Session, reports_dir: &Path) -> BenchResult<PathBuf> {
        let document = self.render(session)?;
        std::fs::create_dir_all(reports_dir)?;
        let path = report_path(reports_dir, session.id(), self.format);
        std::fs::write(&path, document)
            .map_err(|e| BenchError::ReportWrite(format!("{}: {}", path.display(), e)))?;
        info!(session = %session.id(), path = %path.display(), "Report written");
        Ok(path)
    }
}

pub fn report_path(reports_dir: &Path, session_id: &str, format: ReportFormat) -> PathBuf {
    reports_dir.join(format!("{}_report.{}", session_id, format.extension()))
}

fn layer_section<'a>(session: &Session, summary: &'a LayerSummary) -> Result<LayerSection<'a>, SectionError> {
    let records: Vec<&RunRecord> = session.records_for(&summary.layer).collect();
    let Some(first) = records.first() else {
        return Err(SectionError::NoRecords(summary.layer.clone()));
    };
    Ok(LayerSection {
        summary,
        url: first.url().to_string(),
        rows: records.iter().map(|r| ReportRow::from_record(r)).collect(),
        percentiles: records
            .iter()
            .filter_map(|r| r.latency().map(|l| PercentileRow::new(r.concurrency(), l)))
            .collect(),
        chart: rps_chart(&summary.series),
        bars: text_bars(&summary.series, BAR_WIDTH),
    })
}

fn rate(metric: Metric<f64>) -> String {
    metric.render_with(|r| format!("{:.2}%", r))
}

fn concurrency(level: Option<u32>) -> String {
    level
        .map(|c| c.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn trend(summary: &LayerSummary) -> &'static str {
    if !summary.has_data() {
        NOT_AVAILABLE
    } else if summary.degrading {
        "degrading"
    } else {
        "stable"
    }
}

fn levels(session: &Session) -> String {
    session
        .concurrency_levels()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Metadata as (label, value) pairs, shared by every format.
fn metadata(session: &Session) -> Vec<(&'static str, String)> {
    let meta = session.meta();
    vec![
        ("Session", meta.id.clone()),
        ("Suite", meta.name.clone()),
        ("Server", meta.server.clone()),
        ("Started", meta.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("Total tests", session.total_tests().to_string()),
        ("Requests per test", meta.total_requests_per_test.to_string()),
        ("Concurrency levels", levels(session)),
    ]
}

fn totals(view: &SummaryView) -> Vec<(&'static str, String)> {
    vec![
        ("Tests run", view.tests_run.to_string()),
        ("Completed", view.completed.to_string()),
        ("Failed", view.failed.to_string()),
        ("Failure rate", rate(view.failure_rate())),
        ("Excluded from failure rate", view.excluded().to_string()),
    ]
}

fn layer_facts(summary: &LayerSummary) -> Vec<(&'static str, String)> {
    vec![
        ("Mean requests/s", summary.mean_rps.render(2)),
        ("Best concurrency", concurrency(summary.best_concurrency)),
        ("Worst concurrency", concurrency(summary.worst_concurrency)),
        ("Highest error-free concurrency", concurrency(summary.highest_successful_concurrency)),
        ("Failure rate", rate(summary.failure_rate())),
        ("Trend", trend(summary).to_string()),
    ]
}

fn recommendations(view: &SummaryView) -> Vec<String> {
    view.recommendations().iter().map(|r| r.to_string()).collect()
}

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Markdown inline text with the characters that would change its meaning
/// backslash-escaped. Underscores stay as they are; layer names use them.
fn md_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' | '`' | '*' | '|' | '<' | '[' | ']' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

/// A code span that survives backticks in its content.
fn md_code(s: &str) -> String {
    let s = s.replace(['\n', '\r'], " ");
    if s.contains('`') {
        format!("`` {} ``", s)
    } else {
        format!("`{}`", s)
    }
}

/// A Markdown table cell: pipes escaped, line breaks flattened.
fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

const STYLE: &str = "body{font-family:sans-serif;max-width:1100px;margin:0 auto;padding:24px;color:#222}
table{border-collapse:collapse;margin:12px 0}
th,td{border:1px solid #ddd;padding:4px 10px;text-align:right}
th{background:#f4f6f8}
dt{font-weight:bold;float:left;clear:left;width:240px}
dd{margin-left:250px}
.placeholder{color:#888;font-style:italic}
.degrading{color:#b7791f}";

fn render_html(
    out: &mut String,
    session: &Session,
    view: &SummaryView,
    sections: &[Result<LayerSection, SectionError>],
) -> fmt::Result {
    let title = format!("{} - {}", session.meta().name, session.id());
    writeln!(out, "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">")?;
    writeln!(out, "<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>", esc(&title), STYLE)?;
    writeln!(out, "<h1>{}</h1>", esc(&session.meta().name))?;

    writeln!(out, "<dl class=\"metadata\">")?;
    for (label, value) in metadata(session) {
        writeln!(out, "<dt>{}</dt><dd>{}</dd>", label, esc(&value))?;
    }
    writeln!(out, "</dl>")?;

    writeln!(out, "<h2>Summary</h2>\n<dl class=\"summary\">")?;
    for (label, value) in totals(view) {
        writeln!(out, "<dt>{}</dt><dd>{}</dd>", label, esc(&value))?;
    }
    writeln!(out, "</dl>")?;
    if !view.integrity_issues.is_empty() {
        writeln!(out, "<ul class=\"integrity\">")?;
        for issue in &view.integrity_issues {
            writeln!(out, "<li>{}</li>", esc(&issue.to_string()))?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "<h2>Recommendations</h2>")?;
    let advice = recommendations(view);
    if advice.is_empty() {
        writeln!(out, "<p class=\"placeholder\">{}</p>", NO_RECOMMENDATIONS)?;
    } else {
        writeln!(out, "<ul class=\"recommendations\">")?;
        for line in &advice {
            writeln!(out, "<li>{}</li>", esc(line))?;
        }
        writeln!(out, "</ul>")?;
    }

    for (summary, section) in view.layers.iter().zip(sections) {
        writeln!(out, "<section class=\"layer\" id=\"{}\">", esc(summary.layer.as_str()))?;
        writeln!(
            out,
            "<h2>{}</h2>\n<p><code>{}</code></p>",
            esc(&summary.title),
            esc(summary.layer.as_str())
        )?;
        match section {
            Ok(section) => {
                writeln!(out, "<dl>")?;
                writeln!(out, "<dt>Tile URL</dt><dd><code>{}</code></dd>", esc(&section.url))?;
                for (label, value) in layer_facts(section.summary) {
                    writeln!(out, "<dt>{}</dt><dd>{}</dd>", label, esc(&value))?;
                }
                writeln!(out, "</dl>\n<table>\n<tr>")?;
                for head in TABLE_HEADER {
                    write!(out, "<th>{}</th>", head)?;
                }
                writeln!(out, "</tr>")?;
                for row in &section.rows {
                    write!(out, "<tr class=\"run\">")?;
                    for cell in &row.cells {
                        write!(out, "<td>{}</td>", esc(cell))?;
                    }
                    writeln!(out, "</tr>")?;
                }
                writeln!(out, "</table>")?;
                if !section.percentiles.is_empty() {
                    writeln!(out, "<h3>Latency percentiles</h3>\n<table class=\"latency\">\n<tr>")?;
                    for head in PERCENTILE_HEADER {
                        write!(out, "<th>{}</th>", head)?;
                    }
                    writeln!(out, "</tr>")?;
                    for row in &section.percentiles {
                        write!(out, "<tr class=\"percentiles\">")?;
                        for cell in &row.cells {
                            write!(out, "<td>{}</td>", esc(cell))?;
                        }
                        writeln!(out, "</tr>")?;
                    }
                    writeln!(out, "</table>")?;
                }
                match &section.chart {
                    Ok(svg) => out.push_str(svg),
                    Err(e) => writeln!(out, "<p class=\"placeholder\">Chart unavailable: {}</p>", esc(&e.to_string()))?,
                }
            }
            Err(_) => writeln!(out, "<p class=\"placeholder\">{}</p>", NO_DATA)?,
        }
        writeln!(out, "</section>")?;
    }

    writeln!(out, "</body>\n</html>")
}

fn markdown_table<'r>(header: &[&str], rows: impl IntoIterator<Item = &'r [String]>) -> Table {
    let mut table = Table::new();
    table.load_preset(ASCII_MARKDOWN).set_header(header.to_vec());
    for row in rows {
        table.add_row(row.iter().map(|cell| md_cell(cell)).collect::<Vec<_>>());
    }
    table
}

fn render_markdown(
    out: &mut String,
    session: &Session,
    view: &SummaryView,
    sections: &[Result<LayerSection, SectionError>],
) -> fmt::Result {
    writeln!(out, "# {}\n", md_text(&session.meta().name))?;
    for (label, value) in metadata(session) {
        writeln!(out, "- **{}:** {}", label, md_text(&value))?;
    }
    writeln!(out, "\n## Summary\n")?;
    for (label, value) in totals(view) {
        writeln!(out, "- **{}:** {}", label, md_text(&value))?;
    }
    for issue in &view.integrity_issues {
        writeln!(out, "- Warning: {}", md_text(&issue.to_string()))?;
    }

    writeln!(out, "\n## Recommendations\n")?;
    let advice = recommendations(view);
    if advice.is_empty() {
        writeln!(out, "_{}_", NO_RECOMMENDATIONS)?;
    }
    for line in &advice {
        writeln!(out, "- {}", md_text(line))?;
    }

    for (summary, section) in view.layers.iter().zip(sections) {
        writeln!(
            out,
            "\n## {} ({})\n",
            md_text(&summary.title),
            md_code(summary.layer.as_str())
        )?;
        match section {
            Ok(section) => {
                writeln!(out, "- **Tile URL:** {}", md_code(&section.url))?;
                for (label, value) in layer_facts(section.summary) {
                    writeln!(out, "- **{}:** {}", label, md_text(&value))?;
                }
                writeln!(
                    out,
                    "\n{}",
                    markdown_table(&TABLE_HEADER, section.rows.iter().map(|r| &r.cells[..]))
                )?;
                if !section.percentiles.is_empty() {
                    writeln!(
                        out,
                        "\n**Latency percentiles**\n\n{}",
                        markdown_table(&PERCENTILE_HEADER, section.percentiles.iter().map(|r| &r.cells[..]))
                    )?;
                }
                match &section.bars {
                    Ok(bars) => writeln!(out, "\n```text\n{}```", bars)?,
                    Err(e) => writeln!(out, "\n_Throughput bars unavailable: {}_", md_text(&e.to_string()))?,
                }
            }
            Err(_) => writeln!(out, "_{}_", NO_DATA)?,
        }
    }
    Ok(())
}

fn text_table<'r>(header: &[&str], rows: impl IntoIterator<Item = &'r [String]>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row.to_vec());
    }
    table
}

fn render_text(
    out: &mut String,
    session: &Session,
    view: &SummaryView,
    sections: &[Result<LayerSection, SectionError>],
) -> fmt::Result {
    writeln!(out, "{}", session.meta().name)?;
    writeln!(out, "{}", "=".repeat(session.meta().name.chars().count()))?;
    for (label, value) in metadata(session).into_iter().chain(totals(view)) {
        writeln!(out, "{:<28} {}", format!("{}:", label), value)?;
    }
    for issue in &view.integrity_issues {
        writeln!(out, "warning: {}", issue)?;
    }

    writeln!(out, "\nRecommendations")?;
    let advice = recommendations(view);
    if advice.is_empty() {
        writeln!(out, "  {}", NO_RECOMMENDATIONS)?;
    }
    for line in &advice {
        writeln!(out, "  - {}", line)?;
    }

    for (summary, section) in view.layers.iter().zip(sections) {
        writeln!(out, "\n{} ({})", summary.title, summary.layer)?;
        match section {
            Ok(section) => {
                writeln!(out, "  {:<32} {}", "Tile URL:", section.url)?;
                for (label, value) in layer_facts(section.summary) {
                    writeln!(out, "  {:<32} {}", format!("{}:", label), value)?;
                }
                writeln!(
                    out,
                    "{}",
                    text_table(&TABLE_HEADER, section.rows.iter().map(|r| &r.cells[..]))
                )?;
                if !section.percentiles.is_empty() {
                    writeln!(
                        out,
                        "  Latency percentiles:\n{}",
                        text_table(&PERCENTILE_HEADER, section.percentiles.iter().map(|r| &r.cells[..]))
                    )?;
                }
                match &section.bars {
                    Ok(bars) => write!(out, "  Requests/s by concurrency:\n{}", bars)?,
                    Err(e) => writeln!(out, "  Throughput bars unavailable: {}", e)?,
                }
            }
            Err(_) => writeln!(out, "  {}", NO_DATA)?,
        }
    }
    Ok(())
}

/// Console overview of one session, one row per layer.
pub fn console_summary(session: &Session, view: &SummaryView) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Layer",
            "Runs",
            "Mean req/s",
            "Best c",
            "Worst c",
            "Error-free up to",
            "Failure rate",
            "Trend",
        ]);
    for layer in &view.layers {
        table.add_row(vec![
            layer.title.clone(),
            layer.records.to_string(),
            layer.mean_rps.render(2),
            concurrency(layer.best_concurrency),
            concurrency(layer.worst_concurrency),
            concurrency(layer.highest_successful_concurrency),
            rate(layer.failure_rate()),
            trend(layer).to_string(),
        ]);
    }

    format!(
        "Session {} ({}): {} tests, {} completed, {} failed, failure rate {}\n{}",
        session.id(),
        session.meta().server,
        view.tests_run,
        view.completed,
        view.failed,
        rate(view.failure_rate()),
        table
    )
}
