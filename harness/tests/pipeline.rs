#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use harness::core::types::{FailureKind, Status};
use harness::io::process::ProcessSpawner;
use harness::io::report::write_reports;
use harness::io::runner::{CheckSpec, Invocation, RunContext, Runner};
use harness::session::run_session;
use harness::test_support::scratch_root;

const FAKE_ENGINE: &str = r#"script="$1"
log="${script%.do}.log"
echo "Wrapper Sourced: PASS" > "$log"
if grep -q 'global root' "$script"; then
  echo "Root Global Set: PASS" >> "$log"
  echo "    $(head -n 1 "$script")" >> "$log"
fi
"#;

fn shell(name: &str, script: &str, timeout: Duration) -> CheckSpec {
    CheckSpec::new(
        name,
        Invocation::Command {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        },
        timeout,
    )
}

fn context(root: PathBuf, engine_script: PathBuf) -> RunContext {
    RunContext {
        root,
        engine: Some(PathBuf::from("sh")),
        engine_mode_args: vec![engine_script.display().to_string()],
        output_limit_bytes: 64 * 1024,
    }
}

#[test]
fn full_run_produces_records_errors_and_reports() {
    let root = scratch_root(&[
        ("tools/fake_engine.sh", FAKE_ENGINE),
        ("tests/edge_case_tests.do", "display 1\n"),
    ])
    .expect("scratch root");
    let engine_script = root.path().join("tools/fake_engine.sh");

    let specs = vec![
        shell(
            "integrity",
            "printf 'Row Count: PASS\\nDuplicate IDs: FAIL\\n    2 duplicated ids\\n'",
            Duration::from_secs(10),
        )
        .with_category("Data Integrity"),
        CheckSpec::new(
            "missing",
            Invocation::Command {
                program: "/definitely/not/a/real/check".to_string(),
                args: Vec::new(),
            },
            Duration::from_secs(10),
        ),
        CheckSpec::new(
            "edge",
            Invocation::Engine {
                script: PathBuf::from("tests/edge_case_tests.do"),
            },
            Duration::from_secs(10),
        )
        .with_category("Edge Cases"),
        CheckSpec::new(
            "files",
            Invocation::InProcess(Arc::new(|ctx: &RunContext| -> anyhow::Result<String> {
                Ok(format!(
                    "Root Exists: {}\n",
                    if ctx.root.is_dir() { "PASS" } else { "FAIL" }
                ))
            })),
            Duration::from_secs(10),
        ),
    ];

    let runner = Runner::new(ProcessSpawner, context(root.path().to_path_buf(), engine_script));
    let report = run_session(&runner, &specs, false);

    let summary: Vec<(&str, &str, Status)> = report
        .records
        .iter()
        .map(|r| (r.category.as_str(), r.test_name.as_str(), r.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Data Integrity", "Row Count", Status::Pass),
            ("Data Integrity", "Duplicate IDs", Status::Fail),
            ("missing", "missing", Status::Error),
            ("Edge Cases", "Wrapper Sourced", Status::Pass),
            ("Edge Cases", "Root Global Set", Status::Pass),
            ("files", "Root Exists", Status::Pass),
        ]
    );
    assert_eq!(report.records[1].notes, "2 duplicated ids");
    assert!(!report.records[2].notes.is_empty());
    assert!(report.records[4].notes.starts_with("global root"));
    assert_eq!(report.counts.total(), report.records.len());
    assert_eq!(report.checks[1].failure, Some(FailureKind::NotAvailable));

    let leftovers: Vec<_> = fs::read_dir(root.path())
        .expect("read root")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("_harness_"))
        .collect();
    assert!(leftovers.is_empty(), "temp scripts left: {leftovers:?}");

    let reports_dir = root.path().join("tests/reports");
    let paths = write_reports(&report, &reports_dir).expect("reports");
    let html = fs::read_to_string(&paths.html).expect("html");
    assert!(html.contains("<strong>Total Tests:</strong> 6"));
    let csv = fs::read_to_string(&paths.table).expect("csv");
    assert_eq!(csv.lines().count(), 1 + 6);
}

#[test]
fn timed_out_check_is_killed_promptly() {
    let root = scratch_root(&[]).expect("scratch root");
    let runner = Runner::new(
        ProcessSpawner,
        RunContext {
            root: root.path().to_path_buf(),
            engine: None,
            engine_mode_args: Vec::new(),
            output_limit_bytes: 1024,
        },
    );
    let spec = shell(
        "slow",
        "echo 'Started: PASS'; sleep 30 & sleep 30",
        Duration::from_millis(500),
    );

    let started = Instant::now();
    let report = run_session(&runner, &[spec], false);
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].status, Status::Error);
    assert!(report.records[0].notes.contains("timed out"));
    assert_eq!(report.checks[0].failure, Some(FailureKind::TimedOut));
}

#[test]
fn engine_checks_skipped_without_engine() {
    let root = scratch_root(&[]).expect("scratch root");
    let runner = Runner::new(
        ProcessSpawner,
        RunContext {
            root: root.path().to_path_buf(),
            engine: None,
            engine_mode_args: Vec::new(),
            output_limit_bytes: 1024,
        },
    );
    let specs = vec![
        CheckSpec::new(
            "edge",
            Invocation::Engine {
                script: PathBuf::from("tests/edge.do"),
            },
            Duration::from_secs(5),
        ),
        shell("quick", "echo 'Quick: PASS'", Duration::from_secs(5)),
    ];
    let report = run_session(&runner, &specs, false);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "edge");
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].status, Status::Pass);
}
