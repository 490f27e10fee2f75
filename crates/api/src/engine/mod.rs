//! Job admission and supervision.
//!
//! [`admission`] decides whether a job may start, [`launcher`] abstracts how
//! it is isolated, and [`supervisor`] owns a running job until its slot is
//! returned.

pub mod admission;
pub mod launcher;
pub mod process;
pub mod supervisor;
pub mod task;

pub use admission::{AdmissionController, AdmissionSlot};
pub use launcher::{JobLauncher, LaunchError};
pub use process::ProcessLauncher;
pub use supervisor::spawn_job;
pub use task::TaskLauncher;
