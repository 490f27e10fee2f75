//! Ownership of a running job.
//!
//! The supervisor task holds the job's [`AdmissionSlot`] for as long as the
//! launcher runs. Stage events are relayed to the subscriber as they come;
//! the terminal event is held back. Once the launcher has returned, the
//! leftovers in the work directory are removed, a terminal event is
//! synthesized if the launcher produced none, and the slot is returned
//! before that terminal event goes out. A client that resubmits as soon as
//! it sees a job finish is therefore never refused for capacity. This holds
//! on every path including a panic inside the launcher.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::job::SynthesisJob;
use cadence_core::job_events::StatusEvent;
use cadence_core::status_channel::{status_channel, StatusSender};
use cadence_worker::executor::job_dir;
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::engine::admission::AdmissionSlot;
use crate::engine::launcher::{JobLauncher, LaunchError};
use crate::ws::JobRegistry;

/// Start supervising `job` on a new task.
pub fn spawn_job(
    launcher: Arc<dyn JobLauncher>,
    registry: Arc<JobRegistry>,
    slot: AdmissionSlot,
    job: SynthesisJob,
    events: StatusSender,
    work_dir: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let job_id = job.id;
        tracing::info!(job_id = %job_id, "Job started");

        let (relay_tx, mut relay_rx) = status_channel();
        let run = AssertUnwindSafe(launcher.run(job, relay_tx)).catch_unwind();
        let relay = async {
            let mut held = None;
            while let Some(event) = relay_rx.recv().await {
                if event.is_terminal() {
                    held = Some(event);
                } else {
                    events.send(event);
                }
            }
            held
        };
        let (outcome, held) = tokio::join!(run, relay);
        let result =
            outcome.unwrap_or_else(|_| Err(LaunchError::Crashed("launcher panicked".into())));

        remove_leftovers(job_dir(&work_dir, job_id)).await;

        let terminal = match (held, result) {
            (Some(terminal), Ok(())) => terminal,
            (Some(terminal), Err(e)) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Worker ended abnormally after reporting"
                );
                terminal
            }
            (None, result) => {
                let failure = match result {
                    Err(e) => e,
                    Ok(()) => LaunchError::Crashed("exited without reporting a result".into()),
                };
                tracing::error!(
                    job_id = %job_id,
                    error = %failure,
                    "Job ended without a terminal event"
                );
                StatusEvent::failed(&failure)
            }
        };

        drop(slot);
        events.send(terminal);
        registry.mark_finished(job_id).await;
        tracing::info!(job_id = %job_id, "Job finished");
    })
}

/// Last-resort removal of a job directory a crashed worker could not clean.
async fn remove_leftovers(dir: PathBuf) {
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => tracing::warn!(dir = %dir.display(), "Removed leftover job directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove job directory")
        }
    }
}
