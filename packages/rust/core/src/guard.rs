//! In-process per-lead mutual exclusion.
//!
//! A stage takes a [`LeadPermit`] before touching a lead; a second stage on
//! the same lead fails fast with `Busy` instead of queueing. The map holds
//! only in-flight leads: dropping the permit removes the key.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use leadflow_shared::{LeadId, LeadflowError, Result};
use tracing::debug;

#[derive(Clone, Default)]
pub struct LeadGuard {
    held: Arc<Mutex<HashSet<LeadId>>>,
}

/// Exclusive hold on one lead, released on drop.
pub struct LeadPermit {
    held: Arc<Mutex<HashSet<LeadId>>>,
    id: LeadId,
}

impl LeadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lead, or fail with `Busy` if another stage holds it.
    pub fn try_acquire(&self, id: &LeadId) -> Result<LeadPermit> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(id.clone()) {
            debug!(lead_id = %id, "lead busy");
            return Err(LeadflowError::Busy(id.to_string()));
        }
        Ok(LeadPermit {
            held: Arc::clone(&self.held),
            id: id.clone(),
        })
    }

    /// Number of leads currently held.
    pub fn in_flight(&self) -> usize {
        self.held.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for LeadPermit {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}
