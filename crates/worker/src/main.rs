use std::process::ExitCode;

use cadence_core::synthesis::CommandEngine;
use cadence_worker::protocol::{self, LineSink, EXIT_BAD_REQUEST};
use cadence_worker::JobExecutor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs exactly one synthesis job, then exits.
///
/// Spawned by the API server once per admitted job. Logs go to stderr;
/// stdout carries only event lines.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let request = match protocol::read_request(tokio::io::stdin()).await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start job");
            return ExitCode::from(EXIT_BAD_REQUEST);
        }
    };

    let job_id = request.job.id;
    tracing::info!(job_id = %job_id, pid = std::process::id(), "Worker started");

    let storage = cadence_cloud::connect(&request.storage).await;
    let executor = JobExecutor::new(
        storage,
        CommandEngine::new(request.engine),
        request.work_dir,
    );

    let sink = LineSink::new(std::io::stdout());
    let terminal = executor.execute(&request.job, &sink).await;

    tracing::info!(job_id = %job_id, status = terminal.status(), "Worker finished");
    ExitCode::from(protocol::exit_code_for(&terminal))
}
