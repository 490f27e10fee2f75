use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::admission::AdmissionController;
use crate::engine::launcher::JobLauncher;
use crate::ws::JobRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Gate on how many jobs run at once.
    pub admission: Arc<AdmissionController>,
    /// Status channels of live and recently finished jobs.
    pub registry: Arc<JobRegistry>,
    /// Isolation strategy for admitted jobs.
    pub launcher: Arc<dyn JobLauncher>,
}

impl AppState {
    /// Build fresh state: admission sized from `config`, an empty registry.
    pub fn new(config: ServerConfig, launcher: Arc<dyn JobLauncher>) -> Self {
        Self {
            admission: Arc::new(AdmissionController::new(config.max_concurrent_jobs)),
            registry: Arc::new(JobRegistry::new()),
            config: Arc::new(config),
            launcher,
        }
    }
}
