//! # Pending-Call Table
//!
//! Call id → in-flight [`Call`], owned by one connection.
//!
//! `call()`, the dispatch task, timer tasks and draining all run on a
//! multi-threaded runtime, so the table is a concurrent map. Every removal is
//! atomic per key: whoever removes a call is the only one allowed to complete it
//! on behalf of the table.

use std::sync::Arc;

use dashmap::DashMap;

use crate::call::Call;

#[derive(Debug, Default)]
pub struct PendingTable {
    calls: DashMap<u32, Arc<Call>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self { calls: DashMap::new() }
    }

    pub fn insert(&self, call: Arc<Call>) {
        self.calls.insert(call.id(), call);
    }

    pub fn remove(&self, id: u32) -> Option<Arc<Call>> {
        self.calls.remove(&id).map(|(_, call)| call)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Takes every call currently in the table, leaving it empty.
    ///
    /// Calls inserted while draining is in progress may or may not be taken;
    /// callers that insert must check the connection state afterwards.
    pub fn drain(&self) -> Vec<Arc<Call>> {
        let ids: Vec<u32> = self.calls.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}
