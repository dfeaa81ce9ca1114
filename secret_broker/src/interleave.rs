// SPDX-License-Identifier: MIT OR Apache-2.0
//! The interleave guard: at most one mutating request per collection.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use secrets_core::{Result, SecretsError};

/// Busy set of collection names with mutating requests in flight.
#[derive(Clone, Default)]
pub struct InterleaveGuardSet {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl InterleaveGuardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the collection busy for the lifetime of the returned guard.
    /// Fails with the retryable `InterleavedRequest` error if it already is.
    pub fn try_acquire(&self, collection_name: &str) -> Result<InterleaveGuard> {
        let mut busy = self.busy.lock();
        if !busy.insert(collection_name.to_string()) {
            return Err(SecretsError::InterleavedRequest(format!(
                "another request is currently operating on collection {collection_name}"
            )));
        }
        Ok(InterleaveGuard {
            busy: Arc::clone(&self.busy),
            collection_name: collection_name.to_string(),
        })
    }

    pub fn is_busy(&self, collection_name: &str) -> bool {
        self.busy.lock().contains(collection_name)
    }
}

/// RAII guard: the busy flag clears on drop, in every terminal path.
#[derive(Debug)]
pub struct InterleaveGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    collection_name: String,
}

impl Drop for InterleaveGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.collection_name);
    }
}
