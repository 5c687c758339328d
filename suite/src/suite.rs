//! Suite file parsing and validation.
//!
//! A suite is a TOML file listing the checks of one harness run in the order
//! they execute. See `SuiteFile::parse_str` tests for the format.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use harness::io::runner::{CheckSpec, Invocation};
use serde::Deserialize;

use crate::checks::paths_exist;

/// Placeholder in command arguments replaced by the project root.
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// A parsed suite file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteFile {
    pub suite: SuiteMeta,
    #[serde(default)]
    pub checks: Vec<CheckDef>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteMeta {
    pub id: String,
}

/// One entry of `[[checks]]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckDef {
    /// Unique within the suite.
    pub name: String,
    /// Report grouping; defaults to the name.
    pub category: Option<String>,
    /// Overrides `limits.check_timeout_secs`.
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub body: CheckBody,
}

/// What a check does.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckBody {
    /// Run an arbitrary program; `{root}` in arguments is substituted.
    Command { cmd: Vec<String> },
    /// Run a script through the engine in batch mode.
    Engine { script: PathBuf },
    /// Report whether each path exists under the project root.
    PathsExist { paths: Vec<PathBuf> },
}

impl CheckBody {
    pub fn label(&self) -> &'static str {
        match self {
            CheckBody::Command { .. } => "command",
            CheckBody::Engine { .. } => "engine",
            CheckBody::PathsExist { .. } => "paths_exist",
        }
    }
}

impl SuiteFile {
    /// Load and validate a suite file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read suite {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load suite {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let suite: SuiteFile = toml::from_str(contents).context("parse suite")?;
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        if self.suite.id.trim().is_empty() {
            bail!("suite.id must be non-empty");
        }
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        let mut seen = BTreeSet::new();
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate()
                .with_context(|| format!("checks[{index}] invalid"))?;
            if !seen.insert(check.name.as_str()) {
                bail!("duplicate check name {:?}", check.name);
            }
        }
        Ok(())
    }

    /// Checks to run, in file order. An empty `only` selects everything.
    pub fn select(&self, only: &[String]) -> Result<Vec<&CheckDef>> {
        if only.is_empty() {
            return Ok(self.checks.iter().collect());
        }
        for name in only {
            if !self.checks.iter().any(|check| &check.name == name) {
                bail!("unknown check {name:?} in --only");
            }
        }
        Ok(self
            .checks
            .iter()
            .filter(|check| only.contains(&check.name))
            .collect())
    }
}

impl CheckDef {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must be non-empty");
        }
        if let Some(category) = &self.category
            && category.trim().is_empty()
        {
            bail!("category must be non-empty when set");
        }
        if self.timeout_secs == Some(0) {
            bail!("timeout_secs must be > 0");
        }
        match &self.body {
            CheckBody::Command { cmd } => {
                if cmd.is_empty() || cmd[0].trim().is_empty() {
                    bail!("command.cmd must be a non-empty array");
                }
            }
            CheckBody::Engine { script } => {
                if script.as_os_str().is_empty() {
                    bail!("engine.script must be non-empty");
                }
            }
            CheckBody::PathsExist { paths } => {
                if paths.is_empty() {
                    bail!("paths_exist.paths must be a non-empty array");
                }
            }
        }
        Ok(())
    }

    /// Build the runnable spec for a given project root.
    pub fn to_spec(&self, root: &Path, default_timeout: Duration) -> CheckSpec {
        let invocation = match &self.body {
            CheckBody::Command { cmd } => {
                let root = root.display().to_string();
                let mut parts = cmd.iter().map(|part| part.replace(ROOT_PLACEHOLDER, &root));
                Invocation::Command {
                    program: parts.next().unwrap_or_default(),
                    args: parts.collect(),
                }
            }
            CheckBody::Engine { script } => Invocation::Engine {
                script: script.clone(),
            },
            CheckBody::PathsExist { paths } => Invocation::InProcess(paths_exist(paths.clone())),
        };
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        let spec = CheckSpec::new(&self.name, invocation, timeout);
        match &self.category {
            Some(category) => spec.with_category(category),
            None => spec,
        }
    }
}
