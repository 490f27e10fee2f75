//! Job lifecycle events and their JSON wire shape.
//!
//! Every event is serialized as `{"status": ..., "s3_url"?: ..., "error"?: ...}`.
//! Stage events carry only `status`; `completed` carries `s3_url` and `error`
//! carries `error`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `status` value of the successful terminal event.
pub const STATUS_COMPLETED: &str = "completed";

/// `status` value of the failed terminal event.
pub const STATUS_ERROR: &str = "error";

/// Non-terminal pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FetchingReference,
    LoadingModel,
    Generating,
    UploadingResult,
}

impl Stage {
    /// Every stage in the order a successful job passes through them.
    pub const ALL: [Stage; 4] = [
        Stage::FetchingReference,
        Stage::LoadingModel,
        Stage::Generating,
        Stage::UploadingResult,
    ];

    /// Wire name sent in the `status` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchingReference => "downloading_reference",
            Self::LoadingModel => "loading_model",
            Self::Generating => "generating_audio",
            Self::UploadingResult => "uploading_to_s3",
        }
    }

    /// Parse a wire name back into a stage.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle notification for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StatusEventWire", try_from = "StatusEventWire")]
pub enum StatusEvent {
    /// The pipeline entered a new stage.
    Stage(Stage),
    /// The job finished; carries the remote locator of the result.
    Completed { s3_url: String },
    /// The job failed; carries a human-readable description.
    Failed { error: String },
}

impl StatusEvent {
    /// Build a failure event from anything displayable.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Stage(_))
    }

    /// Value of the `status` field.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.as_str(),
            Self::Completed { .. } => STATUS_COMPLETED,
            Self::Failed { .. } => STATUS_ERROR,
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"status":"{}"}}"#, self.status()))
    }
}

/// Flat JSON representation shared by the WebSocket stream and the worker
/// stdout protocol.
#[derive(Debug, Serialize, Deserialize)]
struct StatusEventWire {
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s3_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<StatusEvent> for StatusEventWire {
    fn from(event: StatusEvent) -> Self {
        let status = event.status().to_string();
        match event {
            StatusEvent::Stage(_) => Self {
                status,
                s3_url: None,
                error: None,
            },
            StatusEvent::Completed { s3_url } => Self {
                status,
                s3_url: Some(s3_url),
                error: None,
            },
            StatusEvent::Failed { error } => Self {
                status,
                s3_url: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<StatusEventWire> for StatusEvent {
    type Error = String;

    fn try_from(wire: StatusEventWire) -> Result<Self, Self::Error> {
        match (wire.status.as_str(), wire.s3_url, wire.error) {
            (STATUS_COMPLETED, Some(s3_url), None) => Ok(Self::Completed { s3_url }),
            (STATUS_ERROR, None, Some(error)) => Ok(Self::Failed { error }),
            (name, None, None) => Stage::from_name(name)
                .map(Self::Stage)
                .ok_or_else(|| format!("unknown or incomplete status '{name}'")),
            (name, _, _) => Err(format!("unexpected fields for status '{name}'")),
        }
    }
}
