//! Contract for the external speech-synthesis engine.
//!
//! The model itself is opaque. [`engine::SynthesisEngine`] is the seam the
//! job executor calls through; [`command::CommandEngine`] drives the
//! synthesis CLI as a child process using the shared runner in
//! [`subprocess`].

pub mod command;
pub mod engine;
pub mod subprocess;

pub use command::{CommandEngine, EngineConfig};
pub use engine::{SynthesisEngine, SynthesisError};
