//! In-process execution on a tokio task.
//!
//! The executor shares the server's address space, so only panics are
//! contained (through the task's `JoinHandle`). A native crash in the engine
//! would still take the server down; use [`ProcessLauncher`] in production.
//!
//! [`ProcessLauncher`]: crate::engine::ProcessLauncher

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::job::SynthesisJob;
use cadence_core::status_channel::StatusSender;
use cadence_core::synthesis::SynthesisEngine;
use cadence_worker::JobExecutor;

use crate::engine::launcher::{JobLauncher, LaunchError};

pub struct TaskLauncher<E> {
    executor: Arc<JobExecutor<E>>,
}

impl<E: SynthesisEngine + 'static> TaskLauncher<E> {
    pub fn new(executor: JobExecutor<E>) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }
}

#[async_trait]
impl<E: SynthesisEngine + 'static> JobLauncher for TaskLauncher<E> {
    async fn run(&self, job: SynthesisJob, events: StatusSender) -> Result<(), LaunchError> {
        let executor = Arc::clone(&self.executor);
        let job_id = job.id;

        tokio::spawn(async move {
            executor.execute(&job, &events).await;
        })
        .await
        .map_err(|e| {
            let reason = if e.is_panic() {
                "job task panicked".to_string()
            } else {
                e.to_string()
            };
            tracing::error!(job_id = %job_id, reason = %reason, "Job task ended abnormally");
            LaunchError::Crashed(reason)
        })
    }
}
