//! Background maintenance tasks.

pub mod registry_sweep;
