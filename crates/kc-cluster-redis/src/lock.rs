//! Redis cluster lock.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use kc_cluster::{ClusterError, ClusterLock, ClusterResult};
use tracing::debug;

use crate::config::RedisConfig;
use crate::error::{from_redis_error, lock_error};

/// Deletes the key only while it still holds the caller's node id.
const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

/// Lease lock stored in Redis.
pub struct RedisClusterLock {
    client: Client,
    config: RedisConfig,
    node_id: String,
}

impl RedisClusterLock {
    /// Connects to Redis and returns a lock acquiring for `node_id`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(config: RedisConfig, node_id: impl Into<String>) -> ClusterResult<Self> {
        let redis_config = Config::from_url(&config.url)
            .map_err(|e| ClusterError::Configuration(e.to_string()))?;

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        client.init().await.map_err(from_redis_error)?;

        Ok(Self {
            client,
            config,
            node_id: node_id.into(),
        })
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Current owner of lock `name`.
    ///
    /// ## Errors
    ///
    /// Returns an error if Redis cannot be reached.
    pub async fn holder(&self, name: &str) -> ClusterResult<Option<String>> {
        let key = self.config.lock_key(name);
        self.client.get(&key).await.map_err(from_redis_error)
    }
}

/// Converts a TTL to whole milliseconds for `PX`, never below one.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn ttl_millis(ttl: Duration) -> i64 {
    ttl.as_millis().clamp(1, i64::MAX as u128) as i64
}

#[async_trait]
impl ClusterLock for RedisClusterLock {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn try_acquire(&self, key: &str, ttl: Duration) -> ClusterResult<bool> {
        let redis_key = self.config.lock_key(key);
        let result: Option<String> = self
            .client
            .set(
                &redis_key,
                self.node_id.as_str(),
                Some(Expiration::PX(ttl_millis(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| lock_error(key, e))?;

        let acquired = result.is_some();
        debug!(key, node = %self.node_id, acquired, "lock acquisition attempt");
        Ok(acquired)
    }

    async fn release(&self, key: &str) -> ClusterResult<()> {
        let redis_key = self.config.lock_key(key);
        let deleted: i64 = self
            .client
            .eval(RELEASE_SCRIPT, vec![redis_key], vec![self.node_id.clone()])
            .await
            .map_err(|e| lock_error(key, e))?;

        if deleted == 0 {
            debug!(key, node = %self.node_id, "lease already expired or taken over");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedisClusterLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClusterLock")
            .field("node_id", &self.node_id)
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}
