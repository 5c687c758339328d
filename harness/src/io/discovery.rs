//! Resolve the project root and the engine executable for this machine.
//!
//! Resolution runs once at startup; the results are passed explicitly into the
//! runner. Precedence is always: command line, config file, per-user table,
//! then machine probing.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::config::HarnessConfig;
use crate::io::process::{SpawnRequest, Spawner};

/// Login name of the current user, if the environment exposes one.
pub fn current_username() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Pick the project root.
///
/// A per-user root is only used when it exists on this machine; otherwise the
/// working directory is the fallback. The chosen root must be a directory.
#[instrument(skip_all)]
pub fn resolve_root(
    cli_root: Option<&Path>,
    cfg: &HarnessConfig,
    username: Option<&str>,
    cwd: &Path,
) -> Result<PathBuf> {
    let user_root = username
        .and_then(|name| cfg.users.get(name))
        .and_then(|user| user.root.as_deref())
        .filter(|root| root.is_dir());

    let (root, source) = if let Some(root) = cli_root {
        (root.to_path_buf(), "command line")
    } else if let Some(root) = &cfg.project.root {
        (root.clone(), "config")
    } else if let Some(root) = user_root {
        (root.to_path_buf(), "user table")
    } else {
        (cwd.to_path_buf(), "working directory")
    };

    let root = if root.is_relative() { cwd.join(root) } else { root };
    if !root.is_dir() {
        bail!("project root {} is not a directory", root.display());
    }
    info!(root = %root.display(), source, "project root resolved");
    Ok(root)
}

/// Pick the engine executable, or `None` when nothing can be located.
#[instrument(skip_all)]
pub fn resolve_engine(
    cli_engine: Option<&str>,
    cfg: &HarnessConfig,
    username: Option<&str>,
) -> Option<PathBuf> {
    let user_engine = username
        .and_then(|name| cfg.users.get(name))
        .and_then(|user| user.engine.as_deref());

    if let Some(engine) = cli_engine.or(cfg.engine.command.as_deref()).or(user_engine) {
        debug!(engine, "engine configured explicitly");
        return Some(PathBuf::from(engine));
    }

    if let Some(path) = cfg.engine.search_paths.iter().find(|path| path.is_file()) {
        debug!(path = %path.display(), "engine found in search paths");
        return Some(path.clone());
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    for name in &cfg.engine.search_names {
        if let Some(path) = find_on_path(name, &path_var) {
            debug!(path = %path.display(), "engine found on PATH");
            return Some(path);
        }
    }

    warn!("no engine executable found");
    None
}

/// Look `name` up in a `PATH`-style list of directories.
pub fn find_on_path(name: &str, path_var: &OsString) -> Option<PathBuf> {
    env::split_paths(path_var).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = dir.join(format!("{name}{}", env::consts::EXE_SUFFIX));
        exe.is_file().then_some(exe)
    })
}

/// Run the engine's probe command; the engine is usable iff it exits 0 in time.
#[instrument(skip_all, fields(engine = %engine.display()))]
pub fn probe_engine<S: Spawner>(
    spawner: &S,
    engine: &Path,
    cfg: &HarnessConfig,
    root: &Path,
) -> bool {
    let request = SpawnRequest {
        program: engine.as_os_str().to_os_string(),
        args: cfg.engine.probe_args.iter().map(OsString::from).collect(),
        cwd: root.to_path_buf(),
        timeout: Duration::from_secs(cfg.engine.probe_timeout_secs),
        output_limit_bytes: 64 * 1024,
    };
    match spawner.spawn(&request) {
        Ok(output) if output.success() => {
            info!("engine available");
            true
        }
        Ok(output) => {
            warn!(exit_code = ?output.exit_code, timed_out = output.timed_out, "engine probe failed");
            false
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "engine probe could not start");
            false
        }
    }
}
