//! Temporary wrapper scripts that parameterize engine invocations.
//!
//! Each engine check runs through a generated do-file that sets the project
//! root and then sources the real script. The file lives in the project root
//! because batch-mode engines resolve relative paths and write their transcript
//! (`<stem>.log`) there. [`TempScript`] removes both on drop, so every exit
//! path (success, error, timeout, panic unwinding) cleans up.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, warn};

/// Extension for generated engine scripts.
pub const SCRIPT_EXTENSION: &str = "do";

/// A script file that is deleted, together with its batch log, when dropped.
#[derive(Debug)]
pub struct TempScript {
    path: PathBuf,
    log_path: PathBuf,
}

impl TempScript {
    /// Write `contents` to a fresh, collision-free file inside `dir`.
    pub fn create(dir: &Path, label: &str, contents: &str) -> Result<Self> {
        let name = build_script_name(label, &generate_timestamp(), &generate_short_id());
        let path = dir.join(&name);
        let log_path = path.with_extension("log");
        fs::write(&path, contents)
            .with_context(|| format!("write temp script {}", path.display()))?;
        debug!(path = %path.display(), "temp script created");
        Ok(Self { path, log_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transcript a batch-mode engine writes next to the script.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Read the batch transcript if the engine produced one.
    pub fn read_log(&self) -> Option<String> {
        let bytes = fs::read(&self.log_path).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        for path in [&self.path, &self.log_path] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "temp file removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), err = %err, "failed to remove temp file"),
            }
        }
    }
}

/// Render the wrapper that sets the root global and sources `script`.
pub fn render_engine_wrapper(root: &Path, script: &Path) -> String {
    format!(
        "global root \"{}\"\ndo \"{}\"\n",
        root.display(),
        script.display()
    )
}

pub fn build_script_name(label: &str, timestamp: &str, short_id: &str) -> String {
    let label: String = label
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("_harness_{label}_{timestamp}_{short_id}.{SCRIPT_EXTENSION}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_name_is_sanitized_and_stable() {
        let name = build_script_name("Edge Cases/v2", "20250301_101500_000001", "abc123");
        assert_eq!(name, "_harness_edge_cases_v2_20250301_101500_000001_abc123.do");
    }

    #[test]
    fn names_do_not_collide_in_quick_succession() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = TempScript::create(temp.path(), "check", "a").expect("first");
        let second = TempScript::create(temp.path(), "check", "b").expect("second");
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn drop_removes_script_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = TempScript::create(temp.path(), "check", "display 1\n").expect("create");
        let path = script.path().to_path_buf();
        let log_path = script.log_path().to_path_buf();
        fs::write(&log_path, "transcript").expect("log");
        assert_eq!(script.read_log().as_deref(), Some("transcript"));
        drop(script);
        assert!(!path.exists());
        assert!(!log_path.exists());
    }

    #[test]
    fn wrapper_sets_root_then_sources_script() {
        let wrapper = render_engine_wrapper(Path::new("/proj"), Path::new("/proj/t/edge.do"));
        assert_eq!(wrapper, "global root \"/proj\"\ndo \"/proj/t/edge.do\"\n");
    }
}
