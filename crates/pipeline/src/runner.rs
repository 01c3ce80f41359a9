//! Subprocess execution for the external reconstruction and conversion tools.
//!
//! [`run`] spawns the program directly (no shell), captures stdout/stderr,
//! enforces a wall-clock ceiling and honours a [`CancellationToken`]. A run
//! only counts as successful when the exit code is zero *and* the expected
//! output file, if any, exists afterwards.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::ToolCommand;

/// Maximum stdout or stderr size kept per stream (4 MiB). The rest is drained
/// and discarded so a chatty tool never blocks on a full pipe.
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Amount of stderr carried inside [`ToolError::ProcessError`].
const STDERR_TAIL_BYTES: usize = 4 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error while waiting for tool: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool exited with code {exit_code}: {stderr}")]
    ProcessError { exit_code: i32, stderr: String },

    #[error("Tool exited successfully but {} was not produced", .0.display())]
    OutputMissing(PathBuf),

    #[error("Tool timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Tool run cancelled")]
    Cancelled,
}

/// One fully-specified tool run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub command: ToolCommand,
    /// Arguments appended after [`ToolCommand::leading_args`].
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// File that must exist after a zero exit for the run to succeed.
    pub expected_output: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Run `invocation` to completion, timeout or cancellation.
///
/// On timeout or cancellation the child is killed before returning.
pub async fn run(
    invocation: &ToolInvocation,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError> {
    let program = invocation.command.program.display().to_string();

    let mut cmd = Command::new(&invocation.command.program);
    cmd.args(&invocation.command.leading_args)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &invocation.working_dir {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;
    tracing::debug!(program = %program, pid = child.id(), "Tool spawned");

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            kill(&mut child, &program).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Cancelled);
        }
        _ = tokio::time::sleep(invocation.timeout) => {
            kill(&mut child, &program).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
        status = child.wait() => status?,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
    let exit_code = status.code().unwrap_or(-1);

    if !status.success() {
        return Err(ToolError::ProcessError {
            exit_code,
            stderr: tail(&stderr, STDERR_TAIL_BYTES).to_string(),
        });
    }

    if let Some(expected) = &invocation.expected_output {
        if !tokio::fs::try_exists(expected).await.unwrap_or(false) {
            return Err(ToolError::OutputMissing(expected.clone()));
        }
    }

    Ok(ToolOutput {
        stdout,
        stderr,
        exit_code,
        duration_ms,
    })
}

async fn kill(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(program = %program, error = %e, "Failed to kill tool process");
    }
}

/// Read a stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

/// Last `max` bytes of `s`, moved forward to a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
