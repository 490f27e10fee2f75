//! Per-job status channel.
//!
//! An unbounded, ordered, single-consumer queue from a job's executor to its
//! subscriber. Sending never blocks and never fails loudly: if the
//! subscriber went away the event is dropped. The sender stops accepting
//! events once a terminal event has gone through, so a job can never emit
//! more than one terminal event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::job_events::StatusEvent;

/// Anything a job executor can publish lifecycle events into.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Producer half of a job's status channel.
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
    terminal_sent: Arc<AtomicBool>,
}

/// Consumer half of a job's status channel.
#[derive(Debug)]
pub struct StatusReceiver {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

/// Create a fresh channel for one job.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StatusSender {
            tx,
            terminal_sent: Arc::new(AtomicBool::new(false)),
        },
        StatusReceiver { rx },
    )
}

impl StatusSender {
    /// Queue an event. Returns `false` if it was refused because a terminal
    /// event was already sent.
    ///
    /// Delivery to a dropped receiver is not an error: the subscriber simply
    /// left.
    pub fn send(&self, event: StatusEvent) -> bool {
        if event.is_terminal() {
            if self.terminal_sent.swap(true, Ordering::AcqRel) {
                tracing::warn!(status = event.status(), "Dropping second terminal event");
                return false;
            }
        } else if self.terminal_sent.load(Ordering::Acquire) {
            tracing::warn!(status = event.status(), "Dropping stage event after terminal");
            return false;
        }

        let _ = self.tx.send(event);
        true
    }

    /// Whether a terminal event has been queued.
    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent.load(Ordering::Acquire)
    }
}

impl EventSink for StatusSender {
    fn emit(&self, event: StatusEvent) {
        self.send(event);
    }
}

impl StatusReceiver {
    /// Wait for the next event. `None` once every sender is gone and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_events::Stage;

    #[tokio::test]
    async fn preserves_production_order() {
        let (tx, mut rx) = status_channel();
        for stage in Stage::ALL {
            tx.send(StatusEvent::Stage(stage));
        }
        tx.send(StatusEvent::Completed { s3_url: "u".into() });
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], StatusEvent::Stage(Stage::FetchingReference));
        assert!(seen[4].is_terminal());
    }

    #[tokio::test]
    async fn buffers_until_a_subscriber_reads() {
        let (tx, mut rx) = status_channel();
        tx.send(StatusEvent::Stage(Stage::FetchingReference));
        tx.send(StatusEvent::failed("gone"));
        drop(tx);

        assert_eq!(
            rx.recv().await,
            Some(StatusEvent::Stage(Stage::FetchingReference))
        );
        assert_eq!(rx.recv().await, Some(StatusEvent::failed("gone")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn refuses_events_after_terminal() {
        let (tx, mut rx) = status_channel();
        assert!(tx.send(StatusEvent::failed("first")));
        assert!(!tx.send(StatusEvent::failed("second")));
        assert!(!tx.send(StatusEvent::Stage(Stage::Generating)));
        assert!(tx.terminal_sent());
        drop(tx);

        assert_eq!(rx.recv().await, Some(StatusEvent::failed("first")));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn terminal_flag_is_shared_between_clones() {
        let (tx, _rx) = status_channel();
        let other = tx.clone();
        other.send(StatusEvent::Completed { s3_url: "u".into() });
        assert!(tx.terminal_sent());
    }

    #[test]
    fn sending_without_receiver_does_not_panic() {
        let (tx, rx) = status_channel();
        drop(rx);
        assert!(tx.send(StatusEvent::Stage(Stage::Generating)));
    }
}
