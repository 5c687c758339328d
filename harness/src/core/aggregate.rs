//! Merge per-check records into one ordered collection.

use serde::{Deserialize, Serialize};

use crate::core::types::{CheckKind, CheckOutcome, ResultRecord, Status, StatusCounts};

/// Maximum number of characters of stderr copied into a synthesized ERROR record.
pub const NOTES_LIMIT: usize = 500;

/// One executed check together with the records extracted from its output.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRun {
    pub name: String,
    pub category: String,
    pub kind: CheckKind,
    pub outcome: CheckOutcome,
    pub records: Vec<ResultRecord>,
}

/// Flat, ordered records plus per-status counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub records: Vec<ResultRecord>,
    pub counts: StatusCounts,
}

/// Concatenate records in declaration order.
///
/// Every run whose outcome did not complete contributes one extra ERROR
/// record right after its own records, so infrastructure failures always
/// reach the report.
pub fn aggregate(runs: &[CheckRun]) -> Aggregate {
    let mut records = Vec::new();
    for run in runs {
        records.extend(run.records.iter().cloned());
        if !run.outcome.ran_ok() {
            records.push(infrastructure_error(run));
        }
    }
    let counts = StatusCounts::from_records(&records);
    Aggregate { records, counts }
}

fn infrastructure_error(run: &CheckRun) -> ResultRecord {
    let stderr = run.outcome.stderr.trim();
    let notes = if stderr.is_empty() {
        match (run.outcome.failure, run.outcome.exit_code) {
            (Some(failure), Some(code)) => format!("{} (exit code {code})", failure.describe()),
            (Some(failure), None) => failure.describe().to_string(),
            (None, _) => String::new(),
        }
    } else {
        truncate_chars(stderr, NOTES_LIMIT)
    };
    ResultRecord {
        category: run.category.clone(),
        test_name: run.name.clone(),
        status: Status::Error,
        notes,
    }
}

/// Truncate to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}…", &text[..byte_index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;

    fn record(name: &str, status: Status) -> ResultRecord {
        ResultRecord {
            category: "cat".to_string(),
            test_name: name.to_string(),
            status,
            notes: String::new(),
        }
    }

    fn run(name: &str, outcome: CheckOutcome, records: Vec<ResultRecord>) -> CheckRun {
        CheckRun {
            name: name.to_string(),
            category: format!("{name} category"),
            kind: CheckKind::ExternalProcess,
            outcome,
            records,
        }
    }

    fn ok() -> CheckOutcome {
        CheckOutcome::completed(String::new(), String::new(), Some(0))
    }

    #[test]
    fn preserves_declaration_then_marker_order() {
        let runs = vec![
            run(
                "first",
                ok(),
                vec![record("a", Status::Pass), record("b", Status::Fail)],
            ),
            run("second", ok(), vec![record("c", Status::Warning)]),
        ];
        let merged = aggregate(&runs);
        let names: Vec<_> = merged.records.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(merged.counts.total(), merged.records.len());
    }

    #[test]
    fn failed_outcome_becomes_one_error_record() {
        let runs = vec![
            run("ok", ok(), vec![record("a", Status::Pass)]),
            run(
                "missing",
                CheckOutcome::failed(FailureKind::NotAvailable, "engine not found"),
                Vec::new(),
            ),
        ];
        let merged = aggregate(&runs);
        assert_eq!(merged.records.len(), 2);
        let error = &merged.records[1];
        assert_eq!(error.status, Status::Error);
        assert_eq!(error.test_name, "missing");
        assert_eq!(error.category, "missing category");
        assert_eq!(error.notes, "engine not found");
        assert_eq!(merged.counts.error, 1);
        assert_eq!(merged.counts.pass, 1);
    }

    #[test]
    fn length_matches_records_plus_failed_outcomes() {
        let failed = || CheckOutcome::failed(FailureKind::TimedOut, "timed out after 5s");
        let runs = vec![
            run("a", ok(), vec![record("x", Status::Pass); 3]),
            run("b", failed(), Vec::new()),
            run("c", failed(), vec![record("y", Status::Partial)]),
            run("d", ok(), Vec::new()),
        ];
        let expected = runs.iter().map(|r| r.records.len()).sum::<usize>()
            + runs.iter().filter(|r| !r.outcome.ran_ok()).count();
        let merged = aggregate(&runs);
        assert_eq!(merged.records.len(), expected);
        assert_eq!(merged.counts.total(), expected);
    }

    #[test]
    fn error_notes_are_truncated() {
        let long = "x".repeat(NOTES_LIMIT * 2);
        let runs = vec![run(
            "noisy",
            CheckOutcome::failed(FailureKind::NonZeroExit, long),
            Vec::new(),
        )];
        let merged = aggregate(&runs);
        assert_eq!(merged.records[0].notes.chars().count(), NOTES_LIMIT + 1);
        assert!(merged.records[0].notes.ends_with('…'));
    }

    #[test]
    fn empty_stderr_falls_back_to_failure_description() {
        let mut outcome = CheckOutcome::failed(FailureKind::NonZeroExit, "");
        outcome.exit_code = Some(198);
        let merged = aggregate(&[run("engine", outcome, Vec::new())]);
        assert_eq!(
            merged.records[0].notes,
            "exited with non-zero status (exit code 198)"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("äöü", 2), "äö…");
        assert_eq!(truncate_chars("äöü", 3), "äöü");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn empty_input_is_empty_aggregate() {
        let merged = aggregate(&[]);
        assert!(merged.records.is_empty());
        assert_eq!(merged.counts.pass_rate(), 0.0);
    }
}
