//! HTML report and CSV export of a run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::types::{CheckKind, Status, StatusCounts};
use crate::session::RunReport;

const REPORT_TEMPLATE: &str = include_str!("templates/report.html");
const CSV_HEADER: [&str; 4] = ["category", "test_name", "status", "notes"];

/// Where the two artifacts of one run were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub table: PathBuf,
}

#[derive(Debug, Serialize)]
struct CountsContext {
    total: usize,
    pass: usize,
    fail: usize,
    warning: usize,
    partial: usize,
    inconclusive: usize,
    error: usize,
}

impl From<StatusCounts> for CountsContext {
    fn from(counts: StatusCounts) -> Self {
        Self {
            total: counts.total(),
            pass: counts.pass,
            fail: counts.fail,
            warning: counts.warning,
            partial: counts.partial,
            inconclusive: counts.inconclusive,
            error: counts.error,
        }
    }
}

#[derive(Debug, Serialize)]
struct RowContext<'a> {
    test_name: &'a str,
    status: &'static str,
    class: &'static str,
    symbol: &'static str,
    notes: &'a str,
}

#[derive(Debug, Serialize)]
struct GroupContext<'a> {
    category: &'a str,
    rows: Vec<RowContext<'a>>,
}

#[derive(Debug, Serialize)]
struct CheckContext<'a> {
    name: &'a str,
    kind: &'static str,
    ran_ok: bool,
    failure: Option<&'static str>,
    exit_code: Option<i32>,
    elapsed: String,
    records: usize,
}

fn status_class(status: Status) -> &'static str {
    match status {
        Status::Pass => "pass",
        Status::Fail => "fail",
        Status::Warning => "warning",
        Status::Partial => "partial",
        Status::Inconclusive => "inconclusive",
        Status::Error => "error",
    }
}

fn status_symbol(status: Status) -> &'static str {
    match status {
        Status::Pass => "✓",
        Status::Fail => "✗",
        Status::Warning => "⚠",
        Status::Partial => "◐",
        Status::Inconclusive => "?",
        Status::Error => "‼",
    }
}

fn kind_label(kind: CheckKind) -> &'static str {
    match kind {
        CheckKind::ExternalProcess => "external process",
        CheckKind::InProcess => "in-process",
    }
}

/// Group records by category, categories in order of first appearance.
fn group_by_category(report: &RunReport) -> Vec<GroupContext<'_>> {
    let mut groups: Vec<GroupContext<'_>> = Vec::new();
    for record in &report.records {
        let row = RowContext {
            test_name: &record.test_name,
            status: record.status.as_str(),
            class: status_class(record.status),
            symbol: status_symbol(record.status),
            notes: &record.notes,
        };
        match groups
            .iter_mut()
            .find(|group| group.category == record.category)
        {
            Some(group) => group.rows.push(row),
            None => groups.push(GroupContext {
                category: &record.category,
                rows: vec![row],
            }),
        }
    }
    groups
}

/// Render the HTML report. Values are escaped by the template engine.
pub fn render_html(report: &RunReport) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report.html", REPORT_TEMPLATE)
        .context("load report template")?;
    let template = env.get_template("report.html")?;

    let checks: Vec<CheckContext<'_>> = report
        .checks
        .iter()
        .map(|check| CheckContext {
            name: &check.name,
            kind: kind_label(check.kind),
            ran_ok: check.ran_ok,
            failure: check.failure.map(|failure| failure.describe()),
            exit_code: check.exit_code,
            elapsed: format!("{:.1}", check.elapsed_secs),
            records: check.records,
        })
        .collect();

    let rendered = template
        .render(context! {
            generated_at => report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            counts => CountsContext::from(report.counts),
            pass_rate => format!("{:.1}", report.pass_rate()),
            groups => group_by_category(report),
            checks => checks,
            skipped => &report.skipped,
        })
        .context("render report template")?;
    Ok(rendered)
}

/// Render the CSV export: a header row, then one row per record.
pub fn render_csv(report: &RunReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).context("write csv header")?;
    for record in &report.records {
        writer
            .write_record([
                record.category.as_str(),
                record.test_name.as_str(),
                record.status.as_str(),
                record.notes.as_str(),
            ])
            .context("write csv row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("flush csv: {}", err.error()))
}

/// Write `test_report_<ts>.html` and `combined_results_<ts>.csv` into `dir`.
///
/// Existing reports are never replaced: when either name is taken, a numeric
/// suffix is appended to both.
#[instrument(skip_all, fields(dir = %dir.display(), records = report.records.len()))]
pub fn write_reports(report: &RunReport, dir: &Path) -> Result<ReportPaths> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let stamp = report.generated_at.format("%Y%m%d_%H%M%S_%6f").to_string();
    let paths = unused_paths(dir, &stamp);

    write_pair(&paths, render_html(report)?.as_bytes(), &render_csv(report)?)?;

    info!(html = %paths.html.display(), table = %paths.table.display(), "reports written");
    Ok(paths)
}

fn unused_paths(dir: &Path, stamp: &str) -> ReportPaths {
    let candidate = |suffix: String| ReportPaths {
        html: dir.join(format!("test_report_{stamp}{suffix}.html")),
        table: dir.join(format!("combined_results_{stamp}{suffix}.csv")),
    };
    let mut paths = candidate(String::new());
    let mut n = 1u32;
    while paths.html.exists() || paths.table.exists() {
        paths = candidate(format!("_{n}"));
        n += 1;
    }
    paths
}

/// Both artifacts or neither: the HTML is removed again if the table fails.
fn write_pair(paths: &ReportPaths, html: &[u8], table: &[u8]) -> Result<()> {
    write_atomic(&paths.html, html)?;
    if let Err(err) = write_atomic(&paths.table, table) {
        if let Err(remove_err) = fs::remove_file(&paths.html) {
            warn!(path = %paths.html.display(), err = %remove_err, "failed to remove report");
        }
        return Err(err);
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("report path missing file name {}", path.display()))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    let result = fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp report {}", tmp_path.display()))
        .and_then(|()| {
            fs::rename(&tmp_path, path)
                .with_context(|| format!("replace report {}", path.display()))
        });
    if result.is_err()
        && let Err(err) = fs::remove_file(&tmp_path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %tmp_path.display(), err = %err, "failed to remove temp report");
    }
    result
}
