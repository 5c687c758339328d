//! Shared data model for checks, outcomes and result records.
//!
//! These types are value objects passed downward through the pipeline stages.
//! They do not depend on external state.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Status token attached to a single result record.
///
/// The set is closed: text that names any other status is not a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Warning,
    Partial,
    Inconclusive,
    Error,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pass,
        Status::Fail,
        Status::Warning,
        Status::Partial,
        Status::Inconclusive,
        Status::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Warning => "WARNING",
            Status::Partial => "PARTIAL",
            Status::Inconclusive => "INCONCLUSIVE",
            Status::Error => "ERROR",
        }
    }

    /// FAIL and ERROR make a run unsuccessful; everything else does not.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Fail | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    /// Exact, case-sensitive match against the six tokens.
    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow!("unrecognized status {s:?}"))
    }
}

/// Whether a check shells out or runs inside the harness process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ExternalProcess,
    InProcess,
}

/// Why a check did not complete at the infrastructure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executable could not be located at all.
    NotAvailable,
    /// The process could not be started for another reason.
    SpawnFailed,
    /// The time budget elapsed and the process tree was terminated.
    TimedOut,
    /// The process exited with a non-zero code.
    NonZeroExit,
    /// An in-process check returned an error.
    Errored,
    /// An in-process check panicked.
    Panicked,
}

impl FailureKind {
    pub fn describe(self) -> &'static str {
        match self {
            FailureKind::NotAvailable => "executable not available",
            FailureKind::SpawnFailed => "failed to start process",
            FailureKind::TimedOut => "timed out",
            FailureKind::NonZeroExit => "exited with non-zero status",
            FailureKind::Errored => "check returned an error",
            FailureKind::Panicked => "check panicked",
        }
    }
}

/// Raw result of running one check, produced exactly once per check per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// `None` when the check completed without infrastructure failure.
    pub failure: Option<FailureKind>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub elapsed_secs: f64,
}

impl CheckOutcome {
    pub fn completed(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        Self {
            failure: None,
            stdout,
            stderr,
            exit_code,
            elapsed_secs: 0.0,
        }
    }

    pub fn failed(failure: FailureKind, stderr: impl Into<String>) -> Self {
        Self {
            failure: Some(failure),
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: None,
            elapsed_secs: 0.0,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = elapsed_secs;
        self
    }

    /// Completed without infrastructure failure, independent of logical pass/fail.
    pub fn ran_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn is_not_available(&self) -> bool {
        self.failure == Some(FailureKind::NotAvailable)
    }
}

/// One logical assertion extracted from a check's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub category: String,
    pub test_name: String,
    pub status: Status,
    pub notes: String,
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub warning: usize,
    pub partial: usize,
    pub inconclusive: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status);
        }
        counts
    }

    pub fn add(&mut self, status: Status) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Pass => self.pass,
            Status::Fail => self.fail,
            Status::Warning => self.warning,
            Status::Partial => self.partial,
            Status::Inconclusive => self.inconclusive,
            Status::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        Status::ALL.into_iter().map(|status| self.get(status)).sum()
    }

    /// `pass / total * 100`, defined as 0 for an empty run.
    pub fn pass_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.pass as f64 / total as f64 * 100.0
    }

    pub fn has_failures(&self) -> bool {
        self.fail > 0 || self.error > 0
    }

    fn slot(&mut self, status: Status) -> &mut usize {
        match status {
            Status::Pass => &mut self.pass,
            Status::Fail => &mut self.fail,
            Status::Warning => &mut self.warning,
            Status::Partial => &mut self.partial,
            Status::Inconclusive => &mut self.inconclusive,
            Status::Error => &mut self.error,
        }
    }
}
