//! Harness configuration stored in `harness.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "harness.toml";

/// Harness configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to values that work
/// for the usual project layout; machine-specific paths go in `[users.<name>]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    pub project: ProjectConfig,
    pub engine: EngineConfig,
    pub limits: LimitsConfig,
    /// Per-user overrides keyed by login name.
    pub users: BTreeMap<String, UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Explicit project root. Wins over user tables and the working directory.
    pub root: Option<PathBuf>,
    /// Report directory, relative to the project root.
    pub reports_dir: PathBuf,
    /// Harness log directory, relative to the project root.
    pub log_dir: PathBuf,
    /// Suite file, relative to the project root.
    pub suite_file: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: None,
            reports_dir: PathBuf::from("tests/reports"),
            log_dir: PathBuf::from("3_logfiles/test_logs"),
            suite_file: PathBuf::from("tests/suite.toml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable (name on `PATH` or full path).
    pub command: Option<String>,
    /// Arguments placed between the executable and the script (batch mode).
    pub mode_args: Vec<String>,
    /// Arguments for the availability probe.
    pub probe_args: Vec<String>,
    pub probe_timeout_secs: u64,
    /// Absolute locations checked, in order, when no command is configured.
    pub search_paths: Vec<PathBuf>,
    /// Executable names looked up on `PATH` after `search_paths`.
    pub search_names: Vec<String>,
    /// Skip engine checks entirely.
    pub skip: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut search_paths: Vec<PathBuf> = [
            "/Applications/Stata/StataBE.app/Contents/MacOS/stataBE",
            "/Applications/Stata/StataSE.app/Contents/MacOS/stataSE",
            "/Applications/Stata/StataMP.app/Contents/MacOS/stataMP",
            "/Applications/Stata/Stata.app/Contents/MacOS/stata",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        for version in ["Stata18", "Stata17"] {
            for exe in ["StataSE-64", "StataMP-64", "Stata-64", "StataBE-64"] {
                search_paths.push(
                    PathBuf::from(r"C:\Program Files")
                        .join(version)
                        .join(format!("{exe}.exe")),
                );
            }
        }
        Self {
            command: None,
            mode_args: vec!["-b".to_string(), "do".to_string()],
            probe_args: vec!["-e".to_string(), "display 1".to_string()],
            probe_timeout_secs: 5,
            search_paths,
            search_names: [
                "stata", "stata-se", "stata-mp", "stata-be", "StataMP-64", "StataMP",
                "StataSE-64", "StataSE", "StataBE",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            skip: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Default per-check wall-clock budget in seconds.
    pub check_timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl LimitsConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// Machine-specific locations for one login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    pub root: Option<PathBuf>,
    pub engine: Option<String>,
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limits.check_timeout_secs == 0 {
            return Err(anyhow!("limits.check_timeout_secs must be > 0"));
        }
        if self.limits.output_limit_bytes == 0 {
            return Err(anyhow!("limits.output_limit_bytes must be > 0"));
        }
        if self.engine.probe_timeout_secs == 0 {
            return Err(anyhow!("engine.probe_timeout_secs must be > 0"));
        }
        if let Some(command) = &self.engine.command
            && command.trim().is_empty()
        {
            return Err(anyhow!("engine.command must be non-empty when set"));
        }
        if self.project.reports_dir.as_os_str().is_empty() {
            return Err(anyhow!("project.reports_dir must be non-empty"));
        }
        for (name, user) in &self.users {
            if name.trim().is_empty() {
                return Err(anyhow!("users keys must be non-empty"));
            }
            if let Some(engine) = &user.engine
                && engine.trim().is_empty()
            {
                return Err(anyhow!("users.{name}.engine must be non-empty when set"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HarnessConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
