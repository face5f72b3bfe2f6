//! # kc-cluster-redis
//!
//! Redis implementation of [`kc_cluster::ClusterLock`] using the `fred` crate.
//!
//! A lease is a plain key set with `SET NX PX`, valued with the owning node
//! id. Release runs a compare-and-delete script so a node never removes a
//! lease that expired and passed to someone else.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kc_cluster::ClusterAwareScheduler;
//! use kc_cluster_redis::{RedisClusterLock, RedisConfig};
//!
//! let config = RedisConfig::from_url("redis://redis.internal:6379").key_prefix("kc-lock");
//! let lock = RedisClusterLock::connect(config, "node-a").await?;
//! let scheduler = ClusterAwareScheduler::new(Arc::new(lock));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod lock;

pub use config::RedisConfig;
pub use lock::RedisClusterLock;
