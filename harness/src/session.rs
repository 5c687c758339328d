//! One complete harness run: execute, extract, aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::aggregate::{CheckRun, aggregate};
use crate::core::extract::extract_all;
use crate::core::types::{CheckKind, FailureKind, ResultRecord, StatusCounts};
use crate::io::process::Spawner;
use crate::io::runner::{BatchResult, CheckSpec, Runner, SkippedCheck};

/// Per-check line of the run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub category: String,
    pub kind: CheckKind,
    pub ran_ok: bool,
    pub failure: Option<FailureKind>,
    pub exit_code: Option<i32>,
    pub elapsed_secs: f64,
    /// Records extracted from this check's output.
    pub records: usize,
}

impl CheckSummary {
    fn from_run(run: &CheckRun) -> Self {
        Self {
            name: run.name.clone(),
            category: run.category.clone(),
            kind: run.kind,
            ran_ok: run.outcome.ran_ok(),
            failure: run.outcome.failure,
            exit_code: run.outcome.exit_code,
            elapsed_secs: run.outcome.elapsed_secs,
            records: run.records.len(),
        }
    }
}

/// Everything the reporter needs. `counts.total() == records.len()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub records: Vec<ResultRecord>,
    pub counts: StatusCounts,
    pub generated_at: DateTime<Utc>,
    pub checks: Vec<CheckSummary>,
    pub skipped: Vec<SkippedCheck>,
}

impl RunReport {
    pub fn pass_rate(&self) -> f64 {
        self.counts.pass_rate()
    }

    pub fn has_failures(&self) -> bool {
        self.counts.has_failures()
    }
}

/// Run `specs` in order and fold the outcomes into a report.
#[instrument(skip_all, fields(check_count = specs.len()))]
pub fn run_session<S: Spawner>(
    runner: &Runner<S>,
    specs: &[CheckSpec],
    skip_engine: bool,
) -> RunReport {
    let batch = runner.run_all(specs, skip_engine);
    let report = build_report(batch, Utc::now());
    info!(
        total = report.counts.total(),
        pass = report.counts.pass,
        fail = report.counts.fail,
        error = report.counts.error,
        skipped = report.skipped.len(),
        "session finished"
    );
    report
}

/// Extract records from completed checks and aggregate the batch.
///
/// Output of checks that did not run ok is not scanned; the aggregator adds
/// their ERROR record instead.
pub fn build_report(batch: BatchResult, generated_at: DateTime<Utc>) -> RunReport {
    let runs: Vec<CheckRun> = batch
        .executed
        .into_iter()
        .map(|(spec, outcome)| {
            let records = if outcome.ran_ok() {
                extract_all(&outcome.stdout, &spec.category)
            } else {
                Vec::new()
            };
            CheckRun {
                kind: spec.kind(),
                name: spec.name,
                category: spec.category,
                outcome,
                records,
            }
        })
        .collect();

    let checks = runs.iter().map(CheckSummary::from_run).collect();
    let merged = aggregate(&runs);
    RunReport {
        records: merged.records,
        counts: merged.counts,
        generated_at,
        checks,
        skipped: batch.skipped,
    }
}
