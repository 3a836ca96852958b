// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Error, Result},
    types::TxnId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;

/// A node's in-flight transactions, keyed by ledger id, valued by submission
/// time.
///
/// Shared between the node's sender (inserts) and its poller (removes). Each
/// operation holds the lock only for the map access itself, never across an
/// await point.
#[derive(Debug, Default)]
pub struct PendingTracker {
    pending: Mutex<HashMap<TxnId, Instant>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `id`. An id that is already pending is an invariant
    /// violation. Confirmed ids are forgotten: the ledger never hands out the
    /// same id twice.
    pub fn insert(&self, id: TxnId, submitted_at: Instant) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(Error::DuplicateKey(id));
        }
        pending.insert(id, submitted_at);
        Ok(())
    }

    /// Removes `id` and returns its submission time, or `None` if this
    /// tracker is not waiting on it.
    pub fn confirm_and_remove(&self, id: &TxnId) -> Option<Instant> {
        self.pending.lock().remove(id)
    }

    pub fn contains(&self, id: &TxnId) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of the pending ids.
    pub fn snapshot_ids(&self) -> Vec<TxnId> {
        self.pending.lock().keys().cloned().collect()
    }

    /// Drops everything still pending, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}
