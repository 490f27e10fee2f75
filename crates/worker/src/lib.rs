//! Job execution for Cadence.
//!
//! [`executor::JobExecutor`] runs one synthesis job end to end. The
//! `cadence-worker` binary wraps it in its own OS process so the serving
//! layer survives engine crashes; [`protocol`] defines how that process is
//! fed its job and how it reports events back.

pub mod executor;
pub mod protocol;

pub use executor::{JobExecutor, JobFailure};
pub use protocol::WorkerRequest;
