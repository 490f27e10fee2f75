//! Periodic expiry of unclaimed jobs.
//!
//! A job whose submitter never opens the status stream would keep its
//! buffered events forever. This task drops such entries once they have
//! been finished for longer than the configured TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::JobRegistry;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(registry: Arc<JobRegistry>, ttl: Duration, cancel: CancellationToken) {
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Registry sweep started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Registry sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = registry.sweep_unclaimed(ttl).await;
                if removed > 0 {
                    tracing::info!(removed, "Registry sweep: dropped unclaimed jobs");
                } else {
                    tracing::debug!("Registry sweep: nothing to drop");
                }
            }
        }
    }
}
