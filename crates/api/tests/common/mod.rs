#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use cadence_api::config::{ExecutionMode, ServerConfig};
use cadence_api::engine::{JobLauncher, LaunchError, TaskLauncher};
use cadence_api::router::build_app_router;
use cadence_api::state::AppState;
use cadence_cloud::{LocalStorage, StorageConfig};
use cadence_core::job::SynthesisJob;
use cadence_core::job_events::{Stage, StatusEvent};
use cadence_core::status_channel::StatusSender;
use cadence_core::synthesis::{EngineConfig, SynthesisEngine, SynthesisError};
use cadence_worker::JobExecutor;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

/// Reference sample seeded into every test store.
pub const REFERENCE_KEY: &str = "voices/ref.wav";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(store: &Path, work: &Path, max_concurrent_jobs: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_concurrent_jobs,
        max_text_chars: 300,
        storage: StorageConfig::Local {
            root: store.to_path_buf(),
        },
        engine: EngineConfig {
            program: "python3".into(),
            args: vec!["run_tts.py".into()],
            checkpoint_dir: PathBuf::from("checkpoints"),
            timeout_secs: None,
        },
        work_dir: work.to_path_buf(),
        execution_mode: ExecutionMode::Task,
        worker_bin: PathBuf::from("cadence-worker"),
        unclaimed_job_ttl_secs: 600,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Engine that "synthesizes" by writing the text into the output file.
pub struct EchoEngine;

impl SynthesisEngine for EchoEngine {
    async fn load(&self) -> Result<(), SynthesisError> {
        Ok(())
    }

    async fn synthesize(
        &self,
        _reference: &Path,
        text: &str,
        output: &Path,
    ) -> Result<PathBuf, SynthesisError> {
        tokio::fs::write(output, text.as_bytes())
            .await
            .map_err(SynthesisError::Io)?;
        Ok(output.to_path_buf())
    }
}

/// Launcher whose jobs report one stage, then hold until the test opens
/// the gate.
pub struct GatedLauncher {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl JobLauncher for GatedLauncher {
    async fn run(&self, job: SynthesisJob, events: StatusSender) -> Result<(), LaunchError> {
        events.send(StatusEvent::Stage(Stage::FetchingReference));
        self.gate
            .acquire()
            .await
            .map_err(|e| LaunchError::Protocol(e.to_string()))?
            .forget();
        events.send(StatusEvent::Completed {
            s3_url: format!("file:///store/{}", job.output_file_name()),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub store: TempDir,
    pub work: TempDir,
    gate: Arc<Semaphore>,
}

impl TestApp {
    /// Jobs run the real executor over a local store and [`EchoEngine`].
    pub fn with_executor(max_concurrent_jobs: usize) -> Self {
        let (store, work) = dirs();
        let executor = JobExecutor::new(
            Arc::new(LocalStorage::new(store.path().to_path_buf())),
            EchoEngine,
            work.path().to_path_buf(),
        );
        Self::build(store, work, max_concurrent_jobs, Arc::new(TaskLauncher::new(executor)))
    }

    /// Jobs block until [`release_one`](Self::release_one) is called.
    pub fn gated(max_concurrent_jobs: usize) -> Self {
        let (store, work) = dirs();
        let gate = Arc::new(Semaphore::new(0));
        let launcher = Arc::new(GatedLauncher {
            gate: Arc::clone(&gate),
        });
        let mut app = Self::build(store, work, max_concurrent_jobs, launcher);
        app.gate = gate;
        app
    }

    fn build(
        store: TempDir,
        work: TempDir,
        max_concurrent_jobs: usize,
        launcher: Arc<dyn JobLauncher>,
    ) -> Self {
        let config = test_config(store.path(), work.path(), max_concurrent_jobs);
        let state = AppState::new(config.clone(), launcher);
        let router = build_app_router(state.clone(), &config);
        Self {
            state,
            router,
            store,
            work,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let one gated job finish.
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    /// Wait until every admission slot is free again.
    pub async fn wait_idle(&self) {
        let limit = self.state.admission.limit();
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.state.admission.available() < limit {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not finish in time");
    }

    /// Submit a job with the seeded reference and return the parsed body.
    pub async fn submit(&self, text: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let response = post_json(
            self.router.clone(),
            "/generate-audio",
            serde_json::json!({ "text_prompt": text, "audio_ref_key": REFERENCE_KEY }),
        )
        .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Serve the router on an ephemeral port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }
}

fn dirs() -> (TempDir, TempDir) {
    let store = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(store.path().join("voices")).unwrap();
    std::fs::write(store.path().join(REFERENCE_KEY), b"RIFF").unwrap();
    (store, tempfile::tempdir().unwrap())
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
