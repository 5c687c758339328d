//! CLI command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use harness::core::extract::extract_all;
use harness::exit_codes;
use harness::io::config::HarnessConfig;
use harness::io::discovery::{probe_engine, resolve_engine};
use harness::io::process::ProcessSpawner;
use harness::io::report::write_reports;
use harness::io::runner::{RunContext, Runner};
use harness::session::{RunReport, run_session};
use tracing::{debug, info, warn};

use crate::suite::SuiteFile;

/// Settings shared by every subcommand, resolved once in `main`.
#[derive(Debug, Clone)]
pub struct Setup {
    pub root: PathBuf,
    pub config: HarnessConfig,
    pub username: Option<String>,
    pub cli_engine: Option<String>,
    pub skip_engine: bool,
}

impl Setup {
    /// `--suite` as given, otherwise the configured suite file under the root.
    pub fn suite_path(&self, cli_suite: Option<&Path>) -> PathBuf {
        match cli_suite {
            Some(path) => path.to_path_buf(),
            None => self.root.join(&self.config.project.suite_file),
        }
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(&self.config.project.reports_dir)
    }

    /// Resolve the engine and confirm it starts; `None` when unusable.
    fn usable_engine(&self) -> Option<PathBuf> {
        if self.skip_engine {
            return None;
        }
        let engine = resolve_engine(
            self.cli_engine.as_deref(),
            &self.config,
            self.username.as_deref(),
        )?;
        if probe_engine(&ProcessSpawner, &engine, &self.config, &self.root) {
            Some(engine)
        } else {
            warn!(engine = %engine.display(), "engine did not answer the probe");
            None
        }
    }
}

/// Run the suite and write both reports. Returns the process exit code.
pub fn run_suite(setup: &Setup, cli_suite: Option<&Path>, only: &[String]) -> Result<i32> {
    let suite_path = setup.suite_path(cli_suite);
    let suite = SuiteFile::load(&suite_path)?;
    let selected = suite.select(only)?;
    debug!(suite = %suite.suite.id, checks = selected.len(), "suite loaded");

    let default_timeout = setup.config.limits.check_timeout();
    let specs: Vec<_> = selected
        .iter()
        .map(|check| check.to_spec(&setup.root, default_timeout))
        .collect();

    let needs_engine = specs.iter().any(|spec| spec.needs_engine());
    let engine = if needs_engine {
        setup.usable_engine()
    } else {
        None
    };
    let context = RunContext {
        root: setup.root.clone(),
        engine,
        engine_mode_args: setup.config.engine.mode_args.clone(),
        output_limit_bytes: setup.config.limits.output_limit_bytes,
    };

    info!(suite = %suite.suite.id, root = %setup.root.display(), "starting run");
    let runner = Runner::new(ProcessSpawner, context);
    let report = run_session(&runner, &specs, setup.skip_engine);
    let paths = write_reports(&report, &setup.reports_dir()).context("write reports")?;

    print_summary(&report);
    println!("report: html={}", paths.html.display());
    println!("report: table={}", paths.table.display());

    Ok(if report.has_failures() {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    })
}

fn print_summary(report: &RunReport) {
    for check in &report.checks {
        let state = match check.failure {
            None => "ok".to_string(),
            Some(failure) => failure.describe().to_string(),
        };
        println!(
            "check: name={:?} state={} records={} elapsed_secs={:.2}",
            check.name, state, check.records, check.elapsed_secs
        );
    }
    for skipped in &report.skipped {
        println!("skipped: name={:?} reason={}", skipped.name, skipped.reason);
    }
    let counts = &report.counts;
    println!(
        "summary: total={} pass={} fail={} warning={} error={} partial={} inconclusive={}",
        counts.total(),
        counts.pass,
        counts.fail,
        counts.warning,
        counts.error,
        counts.partial,
        counts.inconclusive
    );
    println!("summary: pass_rate={:.1}%", report.pass_rate());
}

/// List the checks of the suite in run order.
pub fn list_checks(setup: &Setup, cli_suite: Option<&Path>) -> Result<()> {
    let suite = SuiteFile::load(&setup.suite_path(cli_suite))?;
    for check in &suite.checks {
        println!("{}\t{}", check.body.label(), check.name);
    }
    Ok(())
}

/// Show what this machine resolves to.
pub fn detect(setup: &Setup) -> Result<()> {
    println!("detect: root={}", setup.root.display());
    println!(
        "detect: user={}",
        setup.username.as_deref().unwrap_or("<unknown>")
    );
    let engine = resolve_engine(
        setup.cli_engine.as_deref(),
        &setup.config,
        setup.username.as_deref(),
    );
    match engine {
        Some(engine) => {
            let available = probe_engine(&ProcessSpawner, &engine, &setup.config, &setup.root);
            println!("detect: engine={} available={available}", engine.display());
        }
        None => println!("detect: engine=<none> available=false"),
    }
    println!("detect: reports={}", setup.reports_dir().display());
    Ok(())
}

/// Extract records from a saved output file.
pub fn extract_file(path: &Path, category: Option<&str>, json: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let category = match category {
        Some(category) => category.to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let records = extract_all(&text, &category);
    if json {
        let mut payload = serde_json::to_string_pretty(&records).context("serialize json")?;
        payload.push('\n');
        print!("{payload}");
    } else {
        for record in &records {
            println!("{}\t{}\t{}", record.status, record.test_name, record.notes.replace('\n', " | "));
        }
    }
    Ok(())
}
