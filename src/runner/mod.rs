//! Language-agnostic child-process driver.
//!
//! One invocation owns one scratch directory and at most one child process at
//! a time; both are released on every exit path. Code-level failures
//! (compile errors, non-zero exits, timeouts) are normal outcomes, not
//! errors: [`RunnerError`] is reserved for infrastructure faults the caller
//! may retry.

use crate::catalog::{self, BINARY_NAME, RuntimeCommands};
use crate::models::{ExecutionStatus, Language};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use uuid::Uuid;

/// Compiles get at least this long regardless of the run time limit.
pub const COMPILE_TIMEOUT_FLOOR_MS: i64 = 10_000;

const OUTPUT_CHUNK: usize = 8192;

/// How long to wait for pipe EOF after the child is gone or killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOutcome {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: i64,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
}

impl RunnerOutcome {
    pub fn failed(stderr: String, exit_code: i64, execution_time_ms: i64) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr,
            execution_time_ms,
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Failed to write source file: {0}")]
    WriteSource(#[source] std::io::Error),
}

/// Scratch directory with guaranteed removal, panics and cancellation
/// included.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create() -> std::io::Result<Self> {
        let name = format!(
            "runbox-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let path = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(
                "Failed to remove scratch dir {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

#[derive(Clone, Default)]
pub struct Runner;

impl Runner {
    pub fn new() -> Self {
        Self
    }

    /// Run `source` under the language's runtime. The memory limit is an
    /// output-size guard (1 MiB of combined output per configured MB), not
    /// an RSS limit.
    pub async fn run(
        &self,
        language: &Language,
        source: &str,
        time_limit_ms: i64,
        memory_limit_mb: i64,
    ) -> Result<RunnerOutcome, RunnerError> {
        let Some(commands) = catalog::commands_for(language.runtime) else {
            return Ok(RunnerOutcome::failed(
                format!("Unsupported language: {}", language.runtime),
                1,
                0,
            ));
        };

        self.run_with_commands(
            commands,
            &language.file_name,
            source,
            time_limit_ms,
            memory_limit_mb,
        )
        .await
    }

    pub async fn run_with_commands(
        &self,
        commands: &RuntimeCommands,
        file_name: &str,
        source: &str,
        time_limit_ms: i64,
        memory_limit_mb: i64,
    ) -> Result<RunnerOutcome, RunnerError> {
        let scratch = ScratchDir::create().map_err(RunnerError::Scratch)?;

        tokio::fs::write(scratch.path().join(file_name), source)
            .await
            .map_err(RunnerError::WriteSource)?;

        if let Some(template) = commands.compile {
            let argv = catalog::expand_command(template, file_name, BINARY_NAME);
            if let Some(failure) = compile(scratch.path(), &argv, time_limit_ms).await {
                return Ok(failure);
            }
        }

        let argv = catalog::expand_command(commands.run, file_name, BINARY_NAME);
        Ok(run_process(scratch.path(), &argv, time_limit_ms, memory_limit_mb).await)
    }
}

/// Run the compile step. `Some(outcome)` means compilation failed and the
/// run must not happen.
///
/// A non-zero exit is authoritative. The `error` / `not found` substring
/// check only applies to toolchains that exit 0 on failure.
async fn compile(scratch: &Path, argv: &[String], time_limit_ms: i64) -> Option<RunnerOutcome> {
    let timeout = Duration::from_millis(time_limit_ms.max(COMPILE_TIMEOUT_FLOOR_MS) as u64);

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Some(RunnerOutcome::failed(
                format!("Failed to start compiler {}: {}", argv[0], e),
                1,
                0,
            ));
        }
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        // Dropping the future killed the compiler.
        Err(_) => {
            return Some(RunnerOutcome::failed(
                "Compilation timed out".to_string(),
                1,
                0,
            ));
        }
        Ok(Err(e)) => {
            return Some(RunnerOutcome::failed(
                format!("Failed to run compiler {}: {}", argv[0], e),
                1,
                0,
            ));
        }
        Ok(Ok(output)) => output,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    let lowered = combined.to_lowercase();
    let marker = lowered.contains("error") || lowered.contains("not found");

    if !output.status.success() || marker {
        let stderr = if combined.trim().is_empty() {
            "Compilation failed".to_string()
        } else {
            combined
        };
        return Some(RunnerOutcome::failed(stderr, 1, 0));
    }

    None
}

/// Read a chunk from a pipe, or park forever once the pipe is closed so a
/// select! over both pipes never busy-loops. Returns 0 on EOF or read error.
async fn read_chunk<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut [u8]) -> usize {
    match pipe.as_mut() {
        Some(reader) => reader.read(buf).await.unwrap_or(0),
        None => std::future::pending().await,
    }
}

async fn run_process(
    scratch: &Path,
    argv: &[String],
    time_limit_ms: i64,
    memory_limit_mb: i64,
) -> RunnerOutcome {
    let output_cap = memory_limit_mb.max(1) as usize * 1024 * 1024;

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return RunnerOutcome::failed(
                format!("Failed to start process {}: {}", argv[0], e),
                1,
                0,
            );
        }
    };

    let deadline = started + Duration::from_millis(time_limit_ms.max(1) as u64);
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();
    let mut out_chunk = [0u8; OUTPUT_CHUNK];
    let mut err_chunk = [0u8; OUTPUT_CHUNK];

    let mut timed_out = false;
    let mut overflowed = false;
    let mut exit_status: Option<std::process::ExitStatus> = None;
    let mut wait_error: Option<String> = None;

    // Once the child is gone (or killed), surviving grandchildren may keep
    // the pipes open; the drain deadline bounds how long we wait for EOF.
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let process_done = exit_status.is_some() || wait_error.is_some();
        if process_done && stdout_pipe.is_none() && stderr_pipe.is_none() {
            break;
        }
        if (process_done || timed_out || overflowed) && drain_deadline.is_none() {
            drain_deadline = Some(Instant::now() + DRAIN_GRACE);
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline), if !timed_out && !process_done => {
                timed_out = true;
                let _ = child.start_kill();
            }
            _ = tokio::time::sleep_until(drain_deadline.unwrap_or(deadline)),
                if drain_deadline.is_some() =>
            {
                break;
            }
            n = read_chunk(&mut stdout_pipe, &mut out_chunk) => {
                if n == 0 {
                    stdout_pipe = None;
                } else {
                    stdout_buf.extend_from_slice(&out_chunk[..n]);
                    if !overflowed && stdout_buf.len() + stderr_buf.len() > output_cap {
                        overflowed = true;
                        let _ = child.start_kill();
                    }
                }
            }
            n = read_chunk(&mut stderr_pipe, &mut err_chunk) => {
                if n == 0 {
                    stderr_pipe = None;
                } else {
                    stderr_buf.extend_from_slice(&err_chunk[..n]);
                    if !overflowed && stdout_buf.len() + stderr_buf.len() > output_cap {
                        overflowed = true;
                        let _ = child.start_kill();
                    }
                }
            }
            status = child.wait(), if !process_done => {
                match status {
                    Ok(status) => exit_status = Some(status),
                    Err(e) => wait_error = Some(e.to_string()),
                }
            }
        }
    }

    let execution_time_ms = started.elapsed().as_millis() as i64;
    let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

    if timed_out {
        return RunnerOutcome {
            status: ExecutionStatus::Timeout,
            stdout,
            stderr: if stderr.trim().is_empty() {
                "Execution timeout".to_string()
            } else {
                stderr
            },
            execution_time_ms,
            exit_code: None,
            timed_out: true,
        };
    }

    if overflowed {
        let mut stderr = stderr;
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("Output limit of {memory_limit_mb} MB exceeded"));
        return RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout,
            stderr,
            execution_time_ms,
            exit_code: Some(1),
            timed_out: false,
        };
    }

    match exit_status {
        Some(status) if status.success() => RunnerOutcome {
            status: ExecutionStatus::Completed,
            stdout,
            stderr,
            execution_time_ms,
            exit_code: Some(0),
            timed_out: false,
        },
        Some(status) => {
            let code = status.code().map(i64::from).unwrap_or(1);
            RunnerOutcome {
                status: ExecutionStatus::Failed,
                stdout,
                stderr: if stderr.trim().is_empty() {
                    format!("Process exited with code {code}")
                } else {
                    stderr
                },
                execution_time_ms,
                exit_code: Some(code),
                timed_out: false,
            }
        }
        None => RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout,
            stderr: wait_error
                .map(|e| format!("Failed to wait for process: {e}"))
                .unwrap_or_else(|| "Process terminated unexpectedly".to_string()),
            execution_time_ms,
            exit_code: Some(1),
            timed_out: false,
        },
    }
}
