//! Named boolean flags attached to held locks.

use crate::error::Result;
use crate::lease::{AddSignalOutcome, RemoveSignalOutcome, normalize_signal, validate_lock_id};
use crate::store::LeaseStore;
use std::sync::Arc;

/// Typed facade over the store's signal operations.
///
/// Names are validated and lower-cased here, so `Drain` and `drain` are the
/// same signal regardless of backend.
#[derive(Debug)]
pub struct SignalChannel<S: ?Sized> {
    store: Arc<S>,
}

impl<S: LeaseStore + ?Sized> SignalChannel<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn raise(&self, lock_id: &str, signal: &str) -> Result<AddSignalOutcome> {
        validate_lock_id(lock_id)?;
        let signal = normalize_signal(signal)?;
        self.store.add_signal(lock_id, &signal)
    }

    pub fn is_raised(&self, lock_id: &str, signal: &str) -> Result<bool> {
        validate_lock_id(lock_id)?;
        let signal = normalize_signal(signal)?;
        self.store.has_signal(lock_id, &signal)
    }

    pub fn clear(&self, lock_id: &str, signal: &str) -> Result<RemoveSignalOutcome> {
        validate_lock_id(lock_id)?;
        let signal = normalize_signal(signal)?;
        self.store.remove_signal(lock_id, &signal)
    }
}
