//! Process execution without a shell.
//!
//! [`run`] spawns the program directly with a discrete argument vector, pins
//! its working directory, drains both output pipes on helper threads, and
//! polls for exit until the timeout elapses. A timed-out child is killed and
//! its partial output discarded.
//!
//! Each stream keeps at most [`MAX_CAPTURE_BYTES`]; the remainder is read and
//! dropped so the child never blocks on a full pipe.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::SandboxError;

const EXEC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::exec");
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes kept from each of standard output and standard error.
pub const MAX_CAPTURE_BYTES: u64 = 16 * 1024 * 1024;

/// Captured result of a finished process.
///
/// A non-zero exit is an ordinary outcome: `succeeded` is false and the
/// caller decides what to make of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, decoded lossily as UTF-8.
    pub stdout: String,
    /// Standard error, decoded lossily as UTF-8.
    pub stderr: String,
    /// Exit code, or `-1` when the process was ended by a signal.
    pub exit_code: i32,
    /// True when the exit code is zero.
    pub succeeded: bool,
    /// True when either stream exceeded the capture limit and was cut short.
    pub truncated: bool,
}

impl ExecOutput {
    fn from_parts(status: ExitStatus, stdout: &Captured, stderr: &Captured) -> Self {
        let exit_code = status.code().unwrap_or(-1);
        Self {
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            exit_code,
            succeeded: exit_code == 0,
            truncated: stdout.truncated || stderr.truncated,
        }
    }
}

/// Output kept from one stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Runs `command` with `args` in `working_dir`, killing it after
/// `timeout_secs` seconds (at least one).
///
/// Output beyond [`MAX_CAPTURE_BYTES`] per stream is dropped and flagged in
/// [`ExecOutput::truncated`].
///
/// # Errors
///
/// Returns [`SandboxError::Io`] when `working_dir` is not a directory,
/// [`SandboxError::CommandNotFound`] when the program does not exist,
/// [`SandboxError::Spawn`] for other start-up or wait failures, and
/// [`SandboxError::Timeout`] when the deadline passes.
pub fn run(
    command: &str,
    args: &[String],
    working_dir: &Path,
    timeout_secs: u64,
) -> Result<ExecOutput, SandboxError> {
    run_capped(command, args, working_dir, timeout_secs, MAX_CAPTURE_BYTES)
}

pub(crate) fn run_capped(
    command: &str,
    args: &[String],
    working_dir: &Path,
    timeout_secs: u64,
    capture_limit: u64,
) -> Result<ExecOutput, SandboxError> {
    if !working_dir.is_dir() {
        return Err(SandboxError::io(
            working_dir,
            io::Error::new(io::ErrorKind::NotFound, "working directory does not exist"),
        ));
    }
    let bound_secs = timeout_secs.max(1);

    debug!(
        target: EXEC_TARGET,
        command,
        argc = args.len(),
        cwd = %working_dir.display(),
        timeout_secs = bound_secs,
        "spawning process"
    );

    let mut child = Command::new(command)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| spawn_error(command, error))?;

    let stdout_reader = child
        .stdout
        .take()
        .map(|pipe| drain(pipe, capture_limit));
    let stderr_reader = child
        .stderr
        .take()
        .map(|pipe| drain(pipe, capture_limit));

    let status = wait_for_exit(command, &mut child, bound_secs)?;
    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);
    let output = ExecOutput::from_parts(status, &stdout, &stderr);

    debug!(
        target: EXEC_TARGET,
        command,
        exit_code = output.exit_code,
        stdout_bytes = stdout.bytes.len(),
        stderr_bytes = stderr.bytes.len(),
        truncated = output.truncated,
        "process exited"
    );
    Ok(output)
}

/// Returns true when `command` resolves to an executable on `PATH`.
#[must_use]
pub fn is_available(command: &str) -> bool {
    which::which(command).is_ok()
}

fn spawn_error(command: &str, error: io::Error) -> SandboxError {
    if error.kind() == io::ErrorKind::NotFound {
        SandboxError::CommandNotFound {
            command: command.to_owned(),
        }
    } else {
        SandboxError::Spawn {
            command: command.to_owned(),
            source: Arc::new(error),
        }
    }
}

fn drain(mut pipe: impl Read + Send + 'static, limit: u64) -> JoinHandle<Captured> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        drop(pipe.by_ref().take(limit).read_to_end(&mut bytes));
        let overflow = io::copy(&mut pipe, &mut io::sink()).unwrap_or(0);
        Captured {
            bytes,
            truncated: overflow > 0,
        }
    })
}

fn collect(handle: Option<JoinHandle<Captured>>) -> Captured {
    handle
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}

/// Polls the child until it exits, killing it once `timeout_secs` elapse.
///
/// Reader threads of a killed child are left to finish on their own: a
/// grandchild may still hold the pipes open.
fn wait_for_exit(
    command: &str,
    child: &mut Child,
    timeout_secs: u64,
) -> Result<ExitStatus, SandboxError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(
                        target: EXEC_TARGET,
                        command,
                        timeout_secs,
                        "process timed out, killing it"
                    );
                    drop(child.kill());
                    drop(child.wait());
                    return Err(SandboxError::Timeout {
                        command: command.to_owned(),
                        timeout_secs,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(error) => {
                drop(child.kill());
                return Err(SandboxError::Spawn {
                    command: command.to_owned(),
                    source: Arc::new(error),
                });
            }
        }
    }
}
