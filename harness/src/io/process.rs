//! Helpers for running child processes with timeouts and bounded output.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        text
    }

    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        text
    }
}

/// Everything needed to start one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl SpawnRequest {
    pub fn program_display(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Capability for starting processes, substitutable with a fake in tests.
pub trait Spawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<CommandOutput>;
}

/// Spawns real operating-system processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<CommandOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.cwd);
        run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {}", request.program_display()))
    }
}

/// Whether an error chain bottoms out in "file not found" from the OS.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
    })
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On timeout the whole process tree is terminated, not just the direct child.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process tree"
            );
            timed_out = true;
            kill_process_tree(&mut child);
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Put the child in its own process group so the group can be signalled as a unit.
///
/// The child then no longer receives the terminal's SIGINT. Ctrl-C stops the
/// harness but can leave a running engine behind until it finishes on its own.
#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

fn kill_process_tree(child: &mut Child) {
    let pid = child.id();
    match signal_tree(pid) {
        Ok(true) => debug!(pid, "process tree terminated"),
        Ok(false) => warn!(pid, "tree kill reported failure, falling back to direct kill"),
        Err(err) => warn!(pid, err = %err, "tree kill unavailable, falling back to direct kill"),
    }
    // The group kill usually reaps the child already; a second kill is harmless.
    if let Err(err) = child.kill() {
        debug!(pid, err = %err, "direct kill after tree kill");
    }
}

#[cfg(unix)]
fn signal_tree(pid: u32) -> std::io::Result<bool> {
    let status = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

#[cfg(windows)]
fn signal_tree(pid: u32) -> std::io::Result<bool> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

#[cfg(not(any(unix, windows)))]
fn signal_tree(_pid: u32) -> std::io::Result<bool> {
    Ok(false)
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
        assert!(!output.success());
        assert!(!output.timed_out);
    }

    #[test]
    fn output_beyond_limit_is_counted() {
        let output =
            run_command_with_timeout(sh("printf 'abcdef'"), Duration::from_secs(10), 4)
                .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
        assert!(output.stdout_lossy().contains("[stdout truncated 2 bytes]"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_leads_its_own_process_group() {
        let output = run_command_with_timeout(
            sh("read -r line < /proc/$$/stat; set -- $line; echo \"$1 $5\""),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        let fields: Vec<String> = output
            .stdout_lossy()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        assert_eq!(fields.len(), 2, "stat fields: {fields:?}");
        assert_eq!(fields[0], fields[1], "pid should equal pgid");
    }

    #[test]
    fn timeout_kills_grandchildren_too() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 30 & sleep 30; echo never"),
            Duration::from_millis(300),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
        // Reader threads only finish once every holder of the pipes is gone.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = run_command_with_timeout(
            Command::new("/definitely/not/a/real/engine"),
            Duration::from_secs(1),
            1024,
        )
        .expect_err("spawn fails");
        assert!(is_not_found(&err));
    }
}
