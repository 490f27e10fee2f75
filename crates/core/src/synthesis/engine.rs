//! Synthesis engine trait and error type.

use std::fmt;
use std::path::{Path, PathBuf};

/// Errors the synthesis engine can report.
#[derive(Debug)]
pub enum SynthesisError {
    /// Model weights or configuration could not be found or loaded.
    ModelUnavailable(String),
    /// The engine rejected its input (missing reference, bad text).
    InvalidInput(String),
    /// The engine exceeded its configured time budget and was killed.
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },
    /// The engine ran but exited with a non-zero exit code.
    ExecutionFailed {
        /// Process exit code (`-1` if killed by signal).
        exit_code: i32,
        /// Most relevant diagnostic line from stderr.
        message: String,
    },
    /// The engine reported success but did not produce the output file.
    MissingOutput(PathBuf),
    /// An I/O error occurred while spawning or talking to the engine.
    Io(std::io::Error),
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelUnavailable(msg) => write!(f, "model unavailable: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Timeout { elapsed_ms } => {
                write!(f, "synthesis timed out after {elapsed_ms}ms")
            }
            Self::ExecutionFailed { exit_code, message } => {
                write!(f, "engine exited with code {exit_code}: {message}")
            }
            Self::MissingOutput(path) => {
                write!(f, "engine produced no output at {}", path.display())
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for SynthesisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// The external text-to-speech model.
///
/// `load` runs once per job before `synthesize`; both are reported as
/// separate lifecycle stages.
pub trait SynthesisEngine: Send + Sync {
    /// Prepare the model (verify weights, warm caches).
    fn load(&self) -> impl std::future::Future<Output = Result<(), SynthesisError>> + Send;

    /// Render `text` in the voice of `reference` and write the waveform to
    /// `output`. Returns the path of the written file.
    fn synthesize(
        &self,
        reference: &Path,
        text: &str,
        output: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, SynthesisError>> + Send;
}
