//! The job executor.
//!
//! Runs the fixed pipeline for one job:
//!
//! 1. `downloading_reference`: fetch the reference sample into the job's
//!    private work directory.
//! 2. `loading_model`: prepare the synthesis engine.
//! 3. `generating_audio`: render the text.
//! 4. `uploading_to_s3`: store the result.
//!
//! Every failure becomes exactly one `error` event; success becomes exactly
//! one `completed` event. No stage is retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_cloud::{StorageError, StorageGateway};
use cadence_core::job::SynthesisJob;
use cadence_core::job_events::{Stage, StatusEvent};
use cadence_core::status_channel::EventSink;
use cadence_core::synthesis::{SynthesisEngine, SynthesisError};
use cadence_core::types::JobId;

/// Why a job failed. The `Display` text is what the subscriber sees.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("reference audio fetch failed: {0}")]
    ReferenceFetch(#[source] StorageError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[source] SynthesisError),

    #[error("result upload failed: {0}")]
    ResultUpload(#[source] StorageError),
}

/// Runs synthesis jobs against a storage gateway and an engine.
pub struct JobExecutor<E> {
    storage: Arc<dyn StorageGateway>,
    engine: E,
    work_dir: PathBuf,
}

impl<E: SynthesisEngine> JobExecutor<E> {
    pub fn new(storage: Arc<dyn StorageGateway>, engine: E, work_dir: PathBuf) -> Self {
        Self {
            storage,
            engine,
            work_dir,
        }
    }

    /// Private scratch directory of one job.
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        job_dir(&self.work_dir, job_id)
    }

    /// Run `job` to its terminal event, publishing every event into `events`.
    ///
    /// Local temp files are removed before the terminal event is emitted, so
    /// by the time a subscriber sees `completed` or `error` nothing of the
    /// job is left on disk.
    pub async fn execute(&self, job: &SynthesisJob, events: &dyn EventSink) -> StatusEvent {
        let mut scratch = Scratch::new(self.job_dir(job.id));

        let terminal = match self.run_pipeline(job, events, &mut scratch).await {
            Ok(s3_url) => {
                tracing::info!(job_id = %job.id, s3_url = %s3_url, "Job completed");
                StatusEvent::Completed { s3_url }
            }
            Err(failure) => {
                tracing::warn!(job_id = %job.id, error = %failure, "Job failed");
                StatusEvent::failed(&failure)
            }
        };

        drop(scratch);
        events.emit(terminal.clone());
        terminal
    }

    async fn run_pipeline(
        &self,
        job: &SynthesisJob,
        events: &dyn EventSink,
        scratch: &mut Scratch,
    ) -> Result<String, JobFailure> {
        enter(job.id, Stage::FetchingReference, events);
        tokio::fs::create_dir_all(scratch.dir())
            .await
            .map_err(|e| JobFailure::ReferenceFetch(StorageError::Io(e)))?;
        let reference = self
            .storage
            .fetch(&job.audio_ref_key, scratch.dir())
            .await
            .map_err(JobFailure::ReferenceFetch)?;
        scratch.track(reference.clone());

        enter(job.id, Stage::LoadingModel, events);
        self.engine.load().await.map_err(JobFailure::Synthesis)?;

        enter(job.id, Stage::Generating, events);
        let output = scratch.dir().join(job.output_file_name());
        scratch.track(output.clone());
        let output = self
            .engine
            .synthesize(&reference, &job.text_prompt, &output)
            .await
            .map_err(JobFailure::Synthesis)?;

        enter(job.id, Stage::UploadingResult, events);
        self.storage
            .store(&output, &job.output_file_name())
            .await
            .map_err(JobFailure::ResultUpload)
    }
}

/// Scratch directory of `job_id` under `work_dir`.
pub fn job_dir(work_dir: &Path, job_id: JobId) -> PathBuf {
    work_dir.join(job_id.to_string())
}

fn enter(job_id: JobId, stage: Stage, events: &dyn EventSink) {
    tracing::info!(job_id = %job_id, stage = %stage, "Job stage started");
    events.emit(StatusEvent::Stage(stage));
}

/// Temp files of one job, removed when dropped.
///
/// Only paths a stage actually produced are tracked, so a job that failed
/// before generating never tries to delete an output that was never named.
/// The job directory itself is removed last, taking any partial download
/// with it.
struct Scratch {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl Scratch {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Vec::new(),
        }
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn track(&mut self, path: PathBuf) {
        self.files.push(path);
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.files {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
                }
            }
        }

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove job directory");
            }
        }
    }
}
