//! Test-only helpers: a scripted process spawner and record builders.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{ResultRecord, Status};
use crate::io::process::{CommandOutput, SpawnRequest, Spawner};

/// A [`Spawner`] that replays queued results instead of starting processes.
///
/// Every request is recorded. When the last argument names an existing file
/// (the engine wrapper), its contents are captured too, and an optional batch
/// transcript is written next to it the way a batch-mode engine would.
#[derive(Debug, Default)]
pub struct ScriptedSpawner {
    responses: Mutex<VecDeque<Result<CommandOutput>>>,
    requests: Mutex<Vec<SpawnRequest>>,
    scripts: Mutex<Vec<String>>,
    batch_log: Option<String>,
}

impl ScriptedSpawner {
    pub fn new(responses: Vec<Result<CommandOutput>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Write `transcript` to `<wrapper>.log` on every spawn.
    pub fn with_batch_log(mut self, transcript: impl Into<String>) -> Self {
        self.batch_log = Some(transcript.into());
        self
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Contents of the wrapper scripts seen at spawn time.
    pub fn captured_scripts(&self) -> Vec<String> {
        self.scripts.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Spawner for ScriptedSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<CommandOutput> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("requests lock poisoned"))?
            .push(request.clone());

        if let Some(last) = request.args.last().map(Path::new)
            && last.is_file()
        {
            if let Ok(contents) = fs::read_to_string(last) {
                self.scripts
                    .lock()
                    .map_err(|_| anyhow!("scripts lock poisoned"))?
                    .push(contents);
            }
            if let Some(transcript) = &self.batch_log {
                fs::write(last.with_extension("log"), transcript)?;
            }
        }

        self.responses
            .lock()
            .map_err(|_| anyhow!("responses lock poisoned"))?
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response left")))
    }
}

/// Build a record with empty notes.
pub fn record(category: &str, test_name: &str, status: Status) -> ResultRecord {
    ResultRecord {
        category: category.to_string(),
        test_name: test_name.to_string(),
        status,
        notes: String::new(),
    }
}

/// Build a record with notes.
pub fn record_with_notes(
    category: &str,
    test_name: &str,
    status: Status,
    notes: &str,
) -> ResultRecord {
    ResultRecord {
        notes: notes.to_string(),
        ..record(category, test_name, status)
    }
}

/// Successful process output with the given stdout.
pub fn exited_ok(stdout: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        ..CommandOutput::default()
    })
}

/// Scratch project root populated with `(relative path, contents)` files.
pub fn scratch_root(files: &[(&str, &str)]) -> Result<TempDir> {
    let root = tempfile::tempdir().context("create scratch root")?;
    for (relative, contents) in files {
        let path = root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(root)
}
