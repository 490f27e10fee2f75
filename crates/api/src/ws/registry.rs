use std::collections::HashMap;
use std::time::Duration;

use cadence_core::status_channel::StatusReceiver;
use cadence_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

/// Why a subscriber could not attach to a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("job {0} not found")]
    UnknownJob(String),

    #[error("job {0} already has a subscriber")]
    AlreadySubscribed(String),
}

/// Registry state of a single job.
struct JobEntry {
    /// Buffered events, until a subscriber takes them.
    receiver: Option<StatusReceiver>,
    /// When the job was admitted.
    created_at: Timestamp,
    /// When the supervisor settled the job.
    finished_at: Option<Timestamp>,
}

/// Process-wide map from job id to its status channel.
///
/// An entry is created at submission and removed when its subscriber's
/// stream ends. A job nobody subscribes to is dropped by
/// [`sweep_unclaimed`](Self::sweep_unclaimed) some time after it finished.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly admitted job.
    pub async fn insert(&self, job_id: JobId, receiver: StatusReceiver) {
        let entry = JobEntry {
            receiver: Some(receiver),
            created_at: chrono::Utc::now(),
            finished_at: None,
        };
        self.jobs.write().await.insert(job_id, entry);
    }

    /// Check that `job_id` could be subscribed to right now.
    pub async fn check_subscribable(&self, job_id: JobId) -> Result<(), SubscribeError> {
        match self.jobs.read().await.get(&job_id) {
            None => Err(SubscribeError::UnknownJob(job_id.to_string())),
            Some(entry) if entry.receiver.is_none() => {
                Err(SubscribeError::AlreadySubscribed(job_id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Take the job's receiver, binding the caller as its only subscriber.
    ///
    /// Events produced before this call are still buffered in the receiver.
    pub async fn subscribe(&self, job_id: JobId) -> Result<StatusReceiver, SubscribeError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| SubscribeError::UnknownJob(job_id.to_string()))?;
        entry
            .receiver
            .take()
            .ok_or_else(|| SubscribeError::AlreadySubscribed(job_id.to_string()))
    }

    /// Record that the job reached its terminal state.
    pub async fn mark_finished(&self, job_id: JobId) {
        if let Some(entry) = self.jobs.write().await.get_mut(&job_id) {
            entry.finished_at = Some(chrono::Utc::now());
        }
    }

    /// Forget a job.
    pub async fn remove(&self, job_id: JobId) {
        self.jobs.write().await.remove(&job_id);
    }

    /// Whether `job_id` is tracked.
    pub async fn contains(&self, job_id: JobId) -> bool {
        self.jobs.read().await.contains_key(&job_id)
    }

    /// Number of tracked jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Remove finished jobs that were never subscribed to and finished more
    /// than `ttl` ago. Returns how many were removed.
    pub async fn sweep_unclaimed(&self, ttl: Duration) -> usize {
        let now = chrono::Utc::now();

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|job_id, entry| {
            let expired = entry.receiver.is_some()
                && entry
                    .finished_at
                    .and_then(|finished| (now - finished).to_std().ok())
                    .is_some_and(|age| age >= ttl);
            if expired {
                tracing::debug!(
                    job_id = %job_id,
                    created_at = %entry.created_at,
                    "Dropping unclaimed job"
                );
            }
            !expired
        });
        before - jobs.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cadence_core::job_events::StatusEvent;
    use cadence_core::status_channel::status_channel;

    use super::*;

    #[tokio::test]
    async fn subscribe_takes_the_buffered_receiver_once() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        let (tx, rx) = status_channel();
        tx.send(StatusEvent::Completed { s3_url: "u".into() });
        registry.insert(job_id, rx).await;

        registry.check_subscribable(job_id).await.unwrap();
        let mut rx = registry.subscribe(job_id).await.unwrap();
        assert_eq!(rx.recv().await, Some(StatusEvent::Completed { s3_url: "u".into() }));

        assert_matches!(
            registry.check_subscribable(job_id).await,
            Err(SubscribeError::AlreadySubscribed(_))
        );
        assert_matches!(
            registry.subscribe(job_id).await,
            Err(SubscribeError::AlreadySubscribed(_))
        );
    }

    #[tokio::test]
    async fn unknown_job_is_rejected() {
        let registry = JobRegistry::new();
        assert_matches!(
            registry.subscribe(JobId::new()).await,
            Err(SubscribeError::UnknownJob(_))
        );
    }

    #[tokio::test]
    async fn remove_forgets_the_job() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        registry.insert(job_id, status_channel().1).await;
        assert_eq!(registry.len().await, 1);

        registry.remove(job_id).await;
        assert!(!registry.contains(job_id).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn sweep_drops_only_finished_unclaimed_jobs() {
        let registry = JobRegistry::new();
        let running = JobId::new();
        let finished = JobId::new();
        let claimed = JobId::new();
        for id in [running, finished, claimed] {
            registry.insert(id, status_channel().1).await;
        }
        registry.mark_finished(finished).await;
        registry.mark_finished(claimed).await;
        let _stream = registry.subscribe(claimed).await.unwrap();

        assert_eq!(registry.sweep_unclaimed(Duration::from_secs(600)).await, 0);
        assert_eq!(registry.sweep_unclaimed(Duration::ZERO).await, 1);

        assert!(registry.contains(running).await);
        assert!(!registry.contains(finished).await);
        assert!(registry.contains(claimed).await);
    }

    #[tokio::test]
    async fn mark_finished_on_removed_job_is_a_no_op() {
        let registry = JobRegistry::new();
        registry.mark_finished(JobId::new()).await;
        assert_eq!(registry.len().await, 0);
    }
}
