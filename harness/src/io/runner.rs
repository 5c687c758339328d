//! Check execution.
//!
//! The runner turns every [`CheckSpec`] into exactly one [`CheckOutcome`] and
//! never lets a failing check abort the batch: crashes, timeouts, missing
//! executables and in-process errors all come back as data.

use std::ffi::OsString;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{CheckKind, CheckOutcome, FailureKind};
use crate::io::process::{CommandOutput, SpawnRequest, Spawner, is_not_found};
use crate::io::script::{TempScript, render_engine_wrapper};

/// Signature of an in-process check: receives the run context, returns the
/// text it would have printed.
pub type InProcessFn = dyn Fn(&RunContext) -> Result<String> + Send + Sync;

/// How a check is carried out.
#[derive(Clone)]
pub enum Invocation {
    /// Run a script through the statistical engine in batch mode.
    Engine { script: PathBuf },
    /// Run an arbitrary program.
    Command { program: String, args: Vec<String> },
    /// Call a function inside the harness process.
    InProcess(Arc<InProcessFn>),
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Engine { script } => {
                f.debug_struct("Engine").field("script", script).finish()
            }
            Invocation::Command { program, args } => f
                .debug_struct("Command")
                .field("program", program)
                .field("args", args)
                .finish(),
            Invocation::InProcess(_) => f.write_str("InProcess(..)"),
        }
    }
}

/// One registered check. Immutable once built.
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: String,
    pub category: String,
    pub invocation: Invocation,
    pub timeout: Duration,
}

impl CheckSpec {
    pub fn new(name: impl Into<String>, invocation: Invocation, timeout: Duration) -> Self {
        let name = name.into();
        Self {
            category: name.clone(),
            name,
            invocation,
            timeout,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn kind(&self) -> CheckKind {
        match self.invocation {
            Invocation::Engine { .. } | Invocation::Command { .. } => CheckKind::ExternalProcess,
            Invocation::InProcess(_) => CheckKind::InProcess,
        }
    }

    pub fn needs_engine(&self) -> bool {
        matches!(self.invocation, Invocation::Engine { .. })
    }
}

/// Environment shared by every check in a run, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub root: PathBuf,
    pub engine: Option<PathBuf>,
    pub engine_mode_args: Vec<String>,
    pub output_limit_bytes: usize,
}

/// A check that was deliberately not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCheck {
    pub name: String,
    pub reason: String,
}

/// Outcomes of a batch in declaration order, plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub executed: Vec<(CheckSpec, CheckOutcome)>,
    pub skipped: Vec<SkippedCheck>,
}

/// Executes checks one at a time.
pub struct Runner<S: Spawner> {
    spawner: S,
    context: RunContext,
}

impl<S: Spawner> Runner<S> {
    pub fn new(spawner: S, context: RunContext) -> Self {
        Self { spawner, context }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Run every spec in order.
    ///
    /// Engine checks are skipped (not failed) when `skip_engine` is set, when
    /// no engine was resolved, or once an engine check reported the engine as
    /// not available.
    #[instrument(skip_all, fields(check_count = specs.len(), skip_engine = skip_engine))]
    pub fn run_all(&self, specs: &[CheckSpec], skip_engine: bool) -> BatchResult {
        let mut batch = BatchResult::default();
        let mut engine_gone = skip_engine || self.context.engine.is_none();
        let skip_reason = if skip_engine {
            "engine checks disabled"
        } else {
            "engine not available"
        };

        for spec in specs {
            if spec.needs_engine() && engine_gone {
                info!(check = %spec.name, reason = skip_reason, "check skipped");
                batch.skipped.push(SkippedCheck {
                    name: spec.name.clone(),
                    reason: skip_reason.to_string(),
                });
                continue;
            }
            let outcome = self.run(spec);
            if spec.needs_engine() && outcome.is_not_available() {
                warn!(check = %spec.name, "engine vanished, skipping remaining engine checks");
                engine_gone = true;
            }
            batch.executed.push((spec.clone(), outcome));
        }
        batch
    }

    /// Run one check. Never fails.
    #[instrument(skip_all, fields(check = %spec.name, kind = ?spec.kind()))]
    pub fn run(&self, spec: &CheckSpec) -> CheckOutcome {
        let started = Instant::now();
        let outcome = match &spec.invocation {
            Invocation::Engine { script } => self.run_engine(spec, script),
            Invocation::Command { program, args } => {
                let request = self.request(
                    OsString::from(program),
                    args.iter().map(OsString::from).collect(),
                    spec.timeout,
                );
                self.spawn(&request)
            }
            Invocation::InProcess(check) => self.run_in_process(check.as_ref()),
        };
        let outcome = outcome.with_elapsed(started.elapsed().as_secs_f64());
        match outcome.failure {
            None => debug!(elapsed_secs = outcome.elapsed_secs, "check completed"),
            Some(failure) => warn!(
                ?failure,
                elapsed_secs = outcome.elapsed_secs,
                "check did not complete"
            ),
        }
        outcome
    }

    fn run_engine(&self, spec: &CheckSpec, script: &Path) -> CheckOutcome {
        let Some(engine) = &self.context.engine else {
            return CheckOutcome::failed(
                FailureKind::NotAvailable,
                "no engine executable configured or found",
            );
        };
        let script = if script.is_relative() {
            self.context.root.join(script)
        } else {
            script.to_path_buf()
        };
        let wrapper = match TempScript::create(
            &self.context.root,
            &spec.name,
            &render_engine_wrapper(&self.context.root, &script),
        ) {
            Ok(wrapper) => wrapper,
            Err(err) => {
                return CheckOutcome::failed(FailureKind::SpawnFailed, format!("{err:#}"));
            }
        };

        let mut args: Vec<OsString> = self
            .context
            .engine_mode_args
            .iter()
            .map(OsString::from)
            .collect();
        args.push(wrapper.path().as_os_str().to_os_string());
        let request = self.request(engine.as_os_str().to_os_string(), args, spec.timeout);

        let mut outcome = self.spawn(&request);
        if let Some(transcript) = wrapper.read_log() {
            debug!(bytes = transcript.len(), "appending engine batch log");
            if !outcome.stdout.is_empty() && !outcome.stdout.ends_with('\n') {
                outcome.stdout.push('\n');
            }
            outcome.stdout.push_str(&transcript);
        }
        outcome
    }

    fn run_in_process(&self, check: &InProcessFn) -> CheckOutcome {
        match catch_unwind(AssertUnwindSafe(|| check(&self.context))) {
            Ok(Ok(stdout)) => CheckOutcome::completed(stdout, String::new(), None),
            Ok(Err(err)) => CheckOutcome::failed(FailureKind::Errored, format!("{err:#}")),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                CheckOutcome::failed(FailureKind::Panicked, format!("panicked: {message}"))
            }
        }
    }

    fn request(&self, program: OsString, args: Vec<OsString>, timeout: Duration) -> SpawnRequest {
        SpawnRequest {
            program,
            args,
            cwd: self.context.root.clone(),
            timeout,
            output_limit_bytes: self.context.output_limit_bytes,
        }
    }

    fn spawn(&self, request: &SpawnRequest) -> CheckOutcome {
        match self.spawner.spawn(request) {
            Ok(output) => classify_output(request, output),
            Err(err) if is_not_found(&err) => CheckOutcome::failed(
                FailureKind::NotAvailable,
                format!("executable not found: {} ({err:#})", request.program_display()),
            ),
            Err(err) => CheckOutcome::failed(FailureKind::SpawnFailed, format!("{err:#}")),
        }
    }
}

fn classify_output(request: &SpawnRequest, output: CommandOutput) -> CheckOutcome {
    let stdout = output.stdout_lossy();
    let mut stderr = output.stderr_lossy();
    let failure = if output.timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "timed out after {}s; process tree terminated",
            request.timeout.as_secs_f64()
        ));
        Some(FailureKind::TimedOut)
    } else if output.exit_code == Some(0) {
        None
    } else {
        Some(FailureKind::NonZeroExit)
    };
    CheckOutcome {
        failure,
        stdout,
        stderr,
        exit_code: output.exit_code,
        elapsed_secs: 0.0,
    }
}
