//! Child process runner for the synthesis CLI.
//!
//! Spawns a prepared [`Command`], captures stderr, and enforces an optional
//! wall-clock limit. Stdout is discarded: the worker's own stdout carries
//! the event protocol and must not see the engine's chatter. The child is
//! killed when dropped, which is how the timeout path terminates it.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::engine::SynthesisError;

/// Maximum stderr size captured (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `cmd` to completion, killing it if `timeout` elapses first.
pub async fn run_command(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<CommandOutput, SynthesisError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(SynthesisError::Io)?;

    // Drained concurrently so a chatty child cannot block on a full pipe.
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result.map_err(SynthesisError::Io)?,
            Err(_elapsed) => {
                return Err(SynthesisError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => child.wait().await.map_err(SynthesisError::Io)?,
    };

    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
