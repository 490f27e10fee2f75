//! Admission control.
//!
//! A fixed pool of slots, sized once at startup. Admission never waits: a
//! submission either takes a slot on the spot or is turned away.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gate on how many jobs may run at once.
#[derive(Debug)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    limit: usize,
}

/// One taken slot. Dropping it hands the slot back.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// Create a controller with `limit` slots (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Take a slot if one is free. Returns `None` immediately otherwise.
    pub fn try_admit(&self) -> Option<AdmissionSlot> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionSlot { _permit: permit })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Total number of slots.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        tracing::debug!("Admission slot released");
    }
}
