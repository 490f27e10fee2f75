//! Job status streaming.
//!
//! Provides the job registry, the event forwarder, and the HTTP upgrade
//! handler used by Axum routes.

pub mod forwarder;
mod handler;
pub mod registry;

pub use forwarder::{forward_events, ForwardOutcome};
pub use handler::job_stream_handler;
pub use registry::JobRegistry;
