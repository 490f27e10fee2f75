use std::path::PathBuf;
use std::str::FromStr;

use cadence_cloud::StorageConfig;
use cadence_core::job::DEFAULT_MAX_TEXT_CHARS;
use cadence_core::synthesis::EngineConfig;

/// File name of the per-job worker binary, looked up next to the server
/// binary unless `WORKER_BIN` says otherwise.
pub const WORKER_BIN_NAME: &str = "cadence-worker";

/// Errors that make the server refuse to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// How admitted jobs are isolated from the serving process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One `cadence-worker` OS process per job.
    Process,
    /// A tokio task inside the server process.
    Task,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "task" => Ok(Self::Task),
            other => Err(format!("expected 'process' or 'task', got '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Does not apply to
    /// jobs, which run detached from the submitting request.
    pub request_timeout_secs: u64,
    /// Jobs allowed to run at once (default: `1`).
    pub max_concurrent_jobs: usize,
    /// Upper bound on `text_prompt` length in characters (default: `300`).
    pub max_text_chars: usize,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    /// Parent of the per-job scratch directories (default: `output`).
    pub work_dir: PathBuf,
    pub execution_mode: ExecutionMode,
    /// Worker binary spawned per job in [`ExecutionMode::Process`].
    pub worker_bin: PathBuf,
    /// How long a finished job nobody subscribed to keeps its buffered
    /// events (default: `600`).
    pub unclaimed_job_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `HOST`                   | `0.0.0.0`                |
    /// | `PORT`                   | `8000`                   |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    /// | `MAX_CONCURRENT_JOBS`    | `1`                      |
    /// | `MAX_TEXT_CHARS`         | `300`                    |
    /// | `STORAGE_BACKEND`        | `s3`                     |
    /// | `S3_BUCKET_NAME`         | required for `s3`        |
    /// | `S3_ENDPOINT_URL`        | unset                    |
    /// | `LOCAL_STORAGE_ROOT`     | required for `local`     |
    /// | `CHECKPOINT_DIR`         | `checkpoints`            |
    /// | `TTS_COMMAND`            | `python3`                |
    /// | `TTS_ARGS`               | `run_tts.py`             |
    /// | `SYNTHESIS_TIMEOUT_SECS` | unset                    |
    /// | `WORK_DIR`               | `output`                 |
    /// | `EXECUTION_MODE`         | `process`                |
    /// | `WORKER_BIN`             | `cadence-worker` sibling |
    /// | `UNCLAIMED_JOB_TTL_SECS` | `600`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or("PORT", var("PORT"), 8000u16)?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs =
            parse_or("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"), 30)?;

        let max_concurrent_jobs =
            parse_or("MAX_CONCURRENT_JOBS", var("MAX_CONCURRENT_JOBS"), 1usize)?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_CONCURRENT_JOBS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let max_text_chars =
            parse_or("MAX_TEXT_CHARS", var("MAX_TEXT_CHARS"), DEFAULT_MAX_TEXT_CHARS)?;

        let storage = match var("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("s3") => StorageConfig::S3 {
                bucket: var("S3_BUCKET_NAME").ok_or(ConfigError::Missing("S3_BUCKET_NAME"))?,
                endpoint_url: var("S3_ENDPOINT_URL"),
            },
            Some("local") => StorageConfig::Local {
                root: var("LOCAL_STORAGE_ROOT")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::Missing("LOCAL_STORAGE_ROOT"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 's3' or 'local'".into(),
                })
            }
        };

        let timeout_secs = match var("SYNTHESIS_TIMEOUT_SECS") {
            Some(raw) => Some(parse_value("SYNTHESIS_TIMEOUT_SECS", &raw)?),
            None => None,
        };
        let engine = EngineConfig {
            program: var("TTS_COMMAND").unwrap_or_else(|| "python3".into()),
            args: var("TTS_ARGS")
                .unwrap_or_else(|| "run_tts.py".into())
                .split_whitespace()
                .map(String::from)
                .collect(),
            checkpoint_dir: PathBuf::from(
                var("CHECKPOINT_DIR").unwrap_or_else(|| "checkpoints".into()),
            ),
            timeout_secs,
        };

        let work_dir = PathBuf::from(var("WORK_DIR").unwrap_or_else(|| "output".into()));

        let execution_mode = match var("EXECUTION_MODE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "EXECUTION_MODE",
                value: raw.clone(),
                reason,
            })?,
            None => ExecutionMode::Process,
        };

        let worker_bin = match var("WORKER_BIN") {
            Some(path) => PathBuf::from(path),
            None => default_worker_bin()?,
        };

        let unclaimed_job_ttl_secs =
            parse_or("UNCLAIMED_JOB_TTL_SECS", var("UNCLAIMED_JOB_TTL_SECS"), 600)?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_concurrent_jobs,
            max_text_chars,
            storage,
            engine,
            work_dir,
            execution_mode,
            worker_bin,
            unclaimed_job_ttl_secs,
        })
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

fn default_worker_bin() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(|e| ConfigError::Invalid {
        var: "WORKER_BIN",
        value: String::new(),
        reason: format!("cannot locate the server binary: {e}"),
    })?;
    Ok(exe.with_file_name(WORKER_BIN_NAME))
}
