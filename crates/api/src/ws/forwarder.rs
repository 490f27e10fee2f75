//! Relay of one job's status channel onto its subscriber's connection.

use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use cadence_core::job_events::StatusEvent;
use cadence_core::status_channel::StatusReceiver;
use cadence_core::types::JobId;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Interval between keep-alive pings while a job is quiet.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Error description sent when the executor's channel closes early.
pub const EXECUTOR_VANISHED: &str = "job executor exited without reporting a result";

/// How a forwarding session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The job's terminal event reached the subscriber.
    Delivered,
    /// The subscriber left (close frame, socket error, failed send) before
    /// the terminal event.
    SubscriberGone,
    /// The channel closed without a terminal event; a synthesized failure
    /// was sent in its place.
    ExecutorVanished,
}

/// Relay events from `events` to `sink` until the job's terminal event has
/// been sent or the subscriber goes away.
///
/// Each event becomes one JSON text frame. Frames from the client are
/// ignored except for `Close`. A close frame follows the terminal event.
pub async fn forward_events<Si, St, E>(
    job_id: JobId,
    mut events: StatusReceiver,
    mut sink: Si,
    mut inbound: St,
) -> ForwardOutcome
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            next = events.recv() => {
                let (event, vanished) = match next {
                    Some(event) => (event, false),
                    None => {
                        tracing::warn!(job_id = %job_id, "Status channel closed without a terminal event");
                        (StatusEvent::failed(EXECUTOR_VANISHED), true)
                    }
                };
                let terminal = event.is_terminal();

                if let Err(e) = sink.send(Message::Text(event.to_json().into())).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Subscriber send failed");
                    return ForwardOutcome::SubscriberGone;
                }
                tracing::debug!(job_id = %job_id, status = event.status(), "Event forwarded");

                if terminal {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!(job_id = %job_id, error = %e, "Close frame not sent");
                    }
                    return if vanished {
                        ForwardOutcome::ExecutorVanished
                    } else {
                        ForwardOutcome::Delivered
                    };
                }
            }

            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(job_id = %job_id, "Subscriber closed the stream");
                    return ForwardOutcome::SubscriberGone;
                }
                Some(Ok(_)) => {
                    tracing::trace!(job_id = %job_id, "Ignoring client frame");
                }
                Some(Err(e)) => {
                    tracing::debug!(job_id = %job_id, error = %e, "WebSocket receive error");
                    return ForwardOutcome::SubscriberGone;
                }
            },

            _ = heartbeat.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Heartbeat ping failed");
                    return ForwardOutcome::SubscriberGone;
                }
            }
        }
    }
}
