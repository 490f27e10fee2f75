//! Isolation strategies for admitted jobs.

use async_trait::async_trait;
use cadence_core::job::SynthesisJob;
use cadence_core::status_channel::StatusSender;

/// Why a launcher could not bring a job to its terminal event.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The isolated context could not be started or waited on.
    #[error("failed to run worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The job could not be handed to the isolated context.
    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// The isolated context ended without reporting a terminal event.
    #[error("worker process exited unexpectedly: {0}")]
    Crashed(String),
}

/// Runs one job in an isolated execution context.
///
/// Implementations publish every event the job produces into `events`, in
/// order, and return once the context has ended. Every clone of `events`
/// must be dropped by then: the supervisor reads until the channel closes.
/// They do not need to guarantee a terminal event: the supervisor
/// synthesizes one from the returned error when none arrived.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn run(&self, job: SynthesisJob, events: StatusSender) -> Result<(), LaunchError>;
}
