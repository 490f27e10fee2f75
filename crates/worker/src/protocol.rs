//! Worker process protocol.
//!
//! The parent writes one JSON [`WorkerRequest`] to the worker's stdin and
//! closes it. The worker writes every [`StatusEvent`] as one JSON line on
//! stdout, in production order, and logs only to stderr. The exit code
//! mirrors the terminal event.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use cadence_cloud::StorageConfig;
use cadence_core::job::SynthesisJob;
use cadence_core::job_events::StatusEvent;
use cadence_core::status_channel::EventSink;
use cadence_core::synthesis::EngineConfig;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Exit code after a `completed` event.
pub const EXIT_COMPLETED: u8 = 0;

/// Exit code after an `error` event.
pub const EXIT_FAILED: u8 = 1;

/// Exit code when the request on stdin could not be read.
pub const EXIT_BAD_REQUEST: u8 = 2;

/// Everything a worker process needs to run one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: SynthesisJob,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    /// Parent of the per-job scratch directories.
    pub work_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to read worker request: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed worker request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read and parse the request from `reader` until EOF.
pub async fn read_request<R: AsyncRead + Unpin>(
    mut reader: R,
) -> Result<WorkerRequest, ProtocolError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Encode one event as a newline-terminated JSON line.
pub fn encode_event(event: &StatusEvent) -> String {
    let mut line = event.to_json();
    line.push('\n');
    line
}

/// Decode one line written by [`encode_event`].
pub fn decode_event(line: &str) -> Result<StatusEvent, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// Exit code that corresponds to a terminal event.
pub fn exit_code_for(terminal: &StatusEvent) -> u8 {
    match terminal {
        StatusEvent::Completed { .. } => EXIT_COMPLETED,
        _ => EXIT_FAILED,
    }
}

/// [`EventSink`] that writes JSON lines to a blocking writer (stdout in the
/// worker binary), flushing after every event.
pub struct LineSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn emit(&self, event: StatusEvent) {
        let line = encode_event(&event);
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            // The parent stopped reading; nothing left to report to.
            tracing::warn!(status = event.status(), error = %e, "Failed to write event line");
        }
    }
}
