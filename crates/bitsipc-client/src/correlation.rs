//! Outstanding-request bookkeeping.
//!
//! Each request id maps to a single-assignment slot (a one-element
//! `sync_channel`). The entry is removed when the response is delivered,
//! when the waiter gives up, or when the waiter is dropped, so the map only
//! ever holds requests somebody is still waiting on.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

/// Ids stay below 2^31 so peers that parse them as 32-bit integers agree.
const ID_SPACE: u64 = 1 << 31;

struct Entry {
    token: u64,
    slot: SyncSender<Result<Value>>,
}

/// Maps request ids to the callers waiting on them.
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
    next_token: AtomicU64,
}

impl CorrelationRegistry {
    /// Create an empty registry with a randomized id seed.
    pub fn new() -> Self {
        Self::with_seed(random_seed())
    }

    /// Create an empty registry whose first generated id is `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(seed % ID_SPACE),
            next_token: AtomicU64::new(0),
        }
    }

    /// Next request id. Monotonic for the lifetime of the registry.
    pub fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        (n % ID_SPACE).to_string()
    }

    /// Create a slot for `id`.
    ///
    /// Fails with [`ClientError::DuplicateRequestId`] if `id` is already
    /// waiting for a response.
    pub fn register(self: &Arc<Self>, id: impl Into<String>) -> Result<PendingResponse> {
        let id = id.into();
        let (slot, rx) = sync_channel(1);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.lock();
            if pending.contains_key(&id) {
                return Err(ClientError::DuplicateRequestId(id));
            }
            pending.insert(id.clone(), Entry { token, slot });
        }
        trace!(request_id = %id, "registered pending request");

        Ok(PendingResponse {
            id,
            token,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Generate a fresh id and register it.
    pub fn register_next(self: &Arc<Self>) -> PendingResponse {
        loop {
            // Only a wrap of the 31-bit space onto a live id can collide.
            if let Ok(pending) = self.register(self.generate_id()) {
                return pending;
            }
        }
    }

    /// Deliver `outcome` to the caller waiting on `id` and remove the entry.
    ///
    /// Returns `false` when no caller is waiting on `id`; the outcome is
    /// dropped.
    pub fn fulfill(&self, id: &str, outcome: Result<Value>) -> bool {
        let Some(entry) = self.lock().remove(id) else {
            return false;
        };
        // The receiver may have been dropped in the meantime; that waiter no
        // longer cares.
        let _ = entry.slot.try_send(outcome);
        true
    }

    /// Abandon the request `id`. Its waiter observes [`ClientError::Cancelled`].
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.evict(id);
        if removed {
            debug!(request_id = %id, "request cancelled");
        }
        removed
    }

    /// Remove the entry for `id` without delivering anything.
    pub fn evict(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    fn evict_token(&self, id: &str, token: u64) {
        let mut pending = self.lock();
        if pending.get(id).is_some_and(|entry| entry.token == token) {
            pending.remove(id);
        }
    }

    /// Fail every outstanding request with [`ClientError::Disconnected`].
    ///
    /// Returns how many requests were failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            let _ = entry
                .slot
                .try_send(Err(ClientError::Disconnected(reason.to_string())));
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), reason, "failed outstanding requests");
        }
        drained.len()
    }

    /// Whether a caller is waiting on `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

fn random_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(nanos);
    hasher.finish() % ID_SPACE
}

/// The caller's side of one outstanding request.
///
/// Dropping it abandons the request and removes its registry entry.
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    token: u64,
    rx: Receiver<Result<Value>>,
    registry: Arc<CorrelationRegistry>,
}

impl PendingResponse {
    /// Request id this response is correlated with.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the response arrives or the request is abandoned.
    pub fn wait(self) -> Result<Value> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Cancelled),
        }
    }

    /// Block for at most `timeout`.
    ///
    /// On timeout the entry is evicted, so a late response is counted as
    /// unmatched instead of being delivered.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Value> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::Cancelled),
            Err(RecvTimeoutError::Timeout) => {
                self.registry.evict_token(&self.id, self.token);
                // Delivery may have raced with the eviction.
                match self.rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ClientError::Timeout(timeout)),
                }
            }
        }
    }

    /// Take the outcome if it has already arrived.
    ///
    /// Returns `Some(Err(Cancelled))` once the request has been abandoned or
    /// its outcome was already taken.
    pub fn try_take(&self) -> Option<Result<Value>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ClientError::Cancelled)),
        }
    }

    /// Wait up to `timeout` but keep the request outstanding if nothing
    /// arrived.
    pub(crate) fn wait_briefly(&self, timeout: Duration) -> Option<Result<Value>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ClientError::Cancelled)),
        }
    }

    /// Abandon the request.
    pub fn cancel(self) {
        self.registry.cancel(&self.id);
    }

    /// Handle that can abandon this request from another thread.
    pub fn canceller(&self) -> RequestCanceller {
        RequestCanceller {
            id: self.id.clone(),
            token: self.token,
            registry: Arc::clone(&self.registry),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.registry.evict_token(&self.id, self.token);
    }
}

/// Cancels one outstanding request; cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct RequestCanceller {
    id: String,
    token: u64,
    registry: Arc<CorrelationRegistry>,
}

impl RequestCanceller {
    /// Request id this handle cancels.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Abandon the request. Returns `false` if it already completed.
    pub fn cancel(&self) -> bool {
        let mut pending = self.registry.lock();
        if pending
            .get(&self.id)
            .is_some_and(|entry| entry.token == self.token)
        {
            pending.remove(&self.id);
            drop(pending);
            debug!(request_id = %self.id, "request cancelled");
            return true;
        }
        false
    }
}
