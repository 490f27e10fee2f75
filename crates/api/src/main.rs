use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::synthesis::CommandEngine;
use cadence_worker::JobExecutor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_api::config::{ExecutionMode, ServerConfig};
use cadence_api::engine::{JobLauncher, ProcessLauncher, TaskLauncher};
use cadence_api::state::AppState;
use cadence_api::{background, router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence_api=debug,cadence_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_concurrent_jobs = config.max_concurrent_jobs,
        execution_mode = ?config.execution_mode,
        "Loaded server configuration"
    );

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .expect("Failed to create WORK_DIR");

    // --- Job launcher ---
    let launcher: Arc<dyn JobLauncher> = match config.execution_mode {
        ExecutionMode::Process => {
            assert!(
                config.worker_bin.exists(),
                "Worker binary not found at {} (set WORKER_BIN)",
                config.worker_bin.display()
            );
            tracing::info!(worker_bin = %config.worker_bin.display(), "Jobs run in worker processes");
            Arc::new(ProcessLauncher::from_config(&config))
        }
        ExecutionMode::Task => {
            let storage = cadence_cloud::connect(&config.storage).await;
            let executor = JobExecutor::new(
                storage,
                CommandEngine::new(config.engine.clone()),
                config.work_dir.clone(),
            );
            tracing::warn!("Jobs run in-process; an engine crash takes the server down");
            Arc::new(TaskLauncher::new(executor))
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), launcher);

    // --- Registry sweep ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(background::registry_sweep::run(
        Arc::clone(&state.registry),
        Duration::from_secs(config.unclaimed_job_ttl_secs),
        sweep_cancel.clone(),
    ));

    // --- Router ---
    let app = router::build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;
    tracing::info!("Registry sweep stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
