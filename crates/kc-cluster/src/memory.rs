//! Process-local lock store.
//!
//! One [`InMemoryLockStore`] stands in for the shared backend; each simulated
//! node takes its own [`InMemoryClusterLock`] handle from it. Expiry uses the
//! tokio clock so tests can pause and advance time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::ClusterResult;
use crate::lock::ClusterLock;

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// Shared lease table.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a lock handle acquiring for `node_id`.
    #[must_use]
    pub fn handle(self: &Arc<Self>, node_id: impl Into<String>) -> InMemoryClusterLock {
        InMemoryClusterLock {
            store: Arc::clone(self),
            node_id: node_id.into(),
        }
    }

    /// Current owner of `key`, if the lease is still active.
    #[must_use]
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.owner.clone())
    }

    fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get(key)
            && lease.expires_at > now
        {
            return false;
        }
        leases.insert(
            key.to_string(),
            Lease {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        true
    }

    fn release(&self, key: &str, owner: &str) {
        let mut leases = self.leases.lock();
        if leases.get(key).is_some_and(|lease| lease.owner == owner) {
            leases.remove(key);
        }
    }
}

/// Lock handle for one node.
#[derive(Debug, Clone)]
pub struct InMemoryClusterLock {
    store: Arc<InMemoryLockStore>,
    node_id: String,
}

impl InMemoryClusterLock {
    /// Creates a single-node lock with its own store.
    #[must_use]
    pub fn standalone(node_id: impl Into<String>) -> Self {
        InMemoryLockStore::shared().handle(node_id)
    }
}

#[async_trait]
impl ClusterLock for InMemoryClusterLock {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn try_acquire(&self, key: &str, ttl: Duration) -> ClusterResult<bool> {
        Ok(self.store.acquire(key, &self.node_id, ttl))
    }

    async fn release(&self, key: &str) -> ClusterResult<()> {
        self.store.release(key, &self.node_id);
        Ok(())
    }
}
