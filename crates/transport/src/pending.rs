//! Request Table: correlation id → waiting caller

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;
use relay_core::{RequestId, RpcResponse};
use tokio::sync::oneshot;

/// In-flight requests keyed by correlation id
///
/// Every entry is removed exactly once: by [`RequestTable::complete`] when the
/// response arrives, or by [`RequestTable::remove`] when the waiter gives up.
#[derive(Default)]
pub struct RequestTable {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<RpcResponse>>>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Must happen before the request is written.
    ///
    /// `None` if `id` is already in flight; the existing waiter is untouched.
    pub fn register(&self, id: RequestId) -> Option<oneshot::Receiver<RpcResponse>> {
        match self.waiters.lock().entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Some(rx)
            }
        }
    }

    /// Hand the response to its waiter. `false` if nobody is waiting for this id.
    pub fn complete(&self, response: RpcResponse) -> bool {
        let Some(tx) = self.waiters.lock().remove(&response.id) else {
            return false;
        };
        // Receiver may have been dropped between the timeout firing and removal
        tx.send(response).is_ok()
    }

    pub fn remove(&self, id: RequestId) -> bool {
        self.waiters.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
