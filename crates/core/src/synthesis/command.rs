//! Synthesis engine backed by an external command-line program.
//!
//! The program is invoked as
//!
//! ```text
//! <program> <args..> --target_text <text> --audio_ref <ref>
//!                    --output_dir <dir> --audio_name <file>
//! ```
//!
//! with `CHECKPOINT_DIR` in its environment. It must exit 0 and leave the
//! file at `<dir>/<file>`; on failure it prints `ERROR: <reason>` to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::engine::{SynthesisEngine, SynthesisError};
use super::subprocess;

/// Name of the model configuration file expected in the checkpoint directory.
pub const MODEL_CONFIG_FILE: &str = "config.yaml";

/// How to launch the synthesis CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable to run (e.g. `python3`).
    pub program: String,
    /// Leading arguments (e.g. the script path).
    pub args: Vec<String>,
    /// Directory holding model weights and `config.yaml`.
    pub checkpoint_dir: PathBuf,
    /// Optional wall-clock limit for one synthesis call.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// [`SynthesisEngine`] that shells out to the synthesis CLI.
pub struct CommandEngine {
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_secs.map(Duration::from_secs)
    }
}

impl SynthesisEngine for CommandEngine {
    async fn load(&self) -> Result<(), SynthesisError> {
        let model_config = self.config.checkpoint_dir.join(MODEL_CONFIG_FILE);
        match tokio::fs::metadata(&model_config).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(SynthesisError::ModelUnavailable(format!(
                "{} not found",
                model_config.display()
            ))),
        }
    }

    async fn synthesize(
        &self,
        reference: &Path,
        text: &str,
        output: &Path,
    ) -> Result<PathBuf, SynthesisError> {
        if tokio::fs::metadata(reference).await.is_err() {
            return Err(SynthesisError::InvalidInput(format!(
                "reference audio not found: {}",
                reference.display()
            )));
        }

        let (output_dir, audio_name) = split_output(output)?;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--target_text")
            .arg(text)
            .arg("--audio_ref")
            .arg(reference)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--audio_name")
            .arg(audio_name)
            .env("CHECKPOINT_DIR", &self.config.checkpoint_dir);

        let result = subprocess::run_command(&mut cmd, self.timeout()).await?;
        tracing::debug!(
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "Synthesis command finished",
        );

        if !result.success() {
            return Err(SynthesisError::ExecutionFailed {
                exit_code: result.exit_code,
                message: failure_message(&result.stderr),
            });
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(SynthesisError::MissingOutput(output.to_path_buf()));
        }

        Ok(output.to_path_buf())
    }
}

fn split_output(output: &Path) -> Result<(&Path, &std::ffi::OsStr), SynthesisError> {
    match (output.parent(), output.file_name()) {
        (Some(dir), Some(name)) => Ok((dir, name)),
        _ => Err(SynthesisError::InvalidInput(format!(
            "output path has no file name: {}",
            output.display()
        ))),
    }
}

/// Pick the most useful line out of the CLI's stderr.
///
/// Prefers the last `ERROR:` line (prefix stripped), falling back to the last
/// non-empty line.
fn failure_message(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:").map(str::trim))
        .or_else(|| lines.last().copied())
        .unwrap_or("no diagnostic output")
        .to_string()
}
