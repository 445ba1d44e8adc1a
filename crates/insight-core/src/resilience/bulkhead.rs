//! # Bulkhead
//!
//! Caps the number of calls in flight to one dependency. Admission never
//! waits: a full bulkhead refuses immediately. A slot is held by a
//! [`BulkheadPermit`] and returned when the permit is dropped, so every exit
//! path of the guarded call releases it, including a task that outlives the
//! request that spawned it.

use crate::types::Dependency;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Non-blocking concurrency gate
#[derive(Debug, Clone)]
pub struct Bulkhead {
    dependency: Dependency,
    limit: usize,
    semaphore: Arc<Semaphore>,
}

/// One admitted call. Dropping it releases the slot.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    /// `limit` is capped at [`Semaphore::MAX_PERMITS`].
    pub fn new(dependency: Dependency, limit: usize) -> Self {
        if limit > Semaphore::MAX_PERMITS {
            log::warn!(
                "Bulkhead limit {} for {} capped at {}",
                limit,
                dependency,
                Semaphore::MAX_PERMITS
            );
        }
        let limit = limit.min(Semaphore::MAX_PERMITS);
        log::info!("Bulkhead for {} initialized (limit {})", dependency, limit);
        Self {
            dependency,
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserve a slot if one is free; `None` when the bulkhead is full.
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(BulkheadPermit { _permit: permit }),
            Err(_) => {
                log::debug!(
                    "Bulkhead for {} rejected a call ({} in flight)",
                    self.dependency,
                    self.limit
                );
                None
            }
        }
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Admitted calls right now.
    pub fn in_flight(&self) -> usize {
        self.limit - self.available()
    }
}
