//! Domain types shared by the Cadence API server and the job worker.
//!
//! Nothing in this crate touches the network: it defines job identity,
//! lifecycle events and their wire shape, the per-job status channel, and
//! the contract for the external synthesis engine.

pub mod error;
pub mod job;
pub mod job_events;
pub mod status_channel;
pub mod synthesis;
pub mod types;
