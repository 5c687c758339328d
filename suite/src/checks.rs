//! Built-in checks that run inside the harness process.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use harness::io::runner::{InProcessFn, RunContext};

/// Report one marker per path: whether it exists under the project root.
///
/// Each marker is followed by the absolute path as notes, so a failing
/// report row says exactly where the file was expected.
pub fn paths_exist(paths: Vec<PathBuf>) -> Arc<InProcessFn> {
    Arc::new(move |ctx: &RunContext| -> anyhow::Result<String> {
        let mut out = String::new();
        for relative in &paths {
            let absolute = ctx.root.join(relative);
            let (kind, status) = if absolute.is_dir() {
                ("Directory", "PASS")
            } else if absolute.is_file() {
                ("File", "PASS")
            } else {
                ("Path", "FAIL")
            };
            let label = marker_label(&relative.display().to_string());
            writeln!(out, "{kind} exists {label}: {status}")?;
            writeln!(out, "    {}", absolute.display())?;
        }
        Ok(out)
    })
}

/// Replace characters a marker name cannot contain.
pub fn marker_label(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '_' | ' ' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect()
}
