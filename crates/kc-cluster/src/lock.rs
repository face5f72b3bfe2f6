//! Cluster lock trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClusterResult;

/// A lease-based lock shared by every node of the cluster.
///
/// A lock handle belongs to one node; the node id is recorded as the owner
/// on acquisition. Acquisition fails while any owner, this node included,
/// holds an unexpired lease on the key.
#[async_trait]
pub trait ClusterLock: Send + Sync {
    /// Identifier of the node this handle acquires for.
    fn node_id(&self) -> &str;

    /// Atomically acquires `key` for at most `ttl`.
    ///
    /// Returns `Ok(false)` when another lease is active.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> ClusterResult<bool>;

    /// Releases `key` if this node still owns it. Releasing a lease that has
    /// expired or passed to another node is a no-op.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn release(&self, key: &str) -> ClusterResult<()>;
}
