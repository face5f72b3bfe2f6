//! # kc-cluster
//!
//! Cluster coordination for periodic work.
//!
//! Every node runs its own timer per registered task; a shared
//! [`ClusterLock`] keyed by the task name decides which node actually runs a
//! given window. Locks expire, so a node that dies while holding one blocks
//! the task for at most one lock TTL.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use kc_cluster::{ClusterAwareScheduler, InMemoryLockStore};
//!
//! let store = InMemoryLockStore::shared();
//! let scheduler = ClusterAwareScheduler::new(Arc::new(store.handle("node-a")));
//! scheduler.schedule("federation-sync:edugain", Duration::from_secs(900), task)?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod lock;
pub mod memory;
pub mod scheduler;

pub use error::{ClusterError, ClusterResult};
pub use lock::ClusterLock;
pub use memory::{InMemoryClusterLock, InMemoryLockStore};
pub use scheduler::{ClusterAwareScheduler, RunOutcome, ScheduledTask, TaskState};
