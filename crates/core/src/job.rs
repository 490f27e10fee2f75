//! Synthesis job payload and submission validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Default upper bound on the target text, matching the synthesis CLI limit.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 300;

/// Extension of every generated audio file.
pub const OUTPUT_EXTENSION: &str = "wav";

/// Body of `POST /generate-audio`.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioRequest {
    /// Text to synthesize.
    pub text_prompt: String,
    /// Storage key of the reference voice sample.
    #[serde(alias = "audio_ref_s3_key")]
    pub audio_ref_key: String,
}

impl AudioRequest {
    /// Reject empty or oversized input before a slot is consumed.
    pub fn validate(&self, max_text_chars: usize) -> Result<(), CoreError> {
        if self.text_prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "text_prompt must not be empty".into(),
            ));
        }

        let chars = self.text_prompt.chars().count();
        if chars > max_text_chars {
            return Err(CoreError::Validation(format!(
                "text_prompt is too long ({chars} characters, max {max_text_chars})"
            )));
        }

        if self.audio_ref_key.trim().is_empty() {
            return Err(CoreError::Validation(
                "audio_ref_key must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// One admitted synthesis job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisJob {
    pub id: JobId,
    pub text_prompt: String,
    pub audio_ref_key: String,
    pub submitted_at: Timestamp,
}

impl SynthesisJob {
    /// Create a job with a fresh identifier from a validated request.
    pub fn from_request(request: AudioRequest) -> Self {
        Self {
            id: JobId::new(),
            text_prompt: request.text_prompt,
            audio_ref_key: request.audio_ref_key,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// File name of the generated audio, also used as the result key.
    pub fn output_file_name(&self) -> String {
        format!("{}.{OUTPUT_EXTENSION}", self.id)
    }
}
