//! # kc-federation
//!
//! Identity provider federations for realms.
//!
//! A federation points at a metadata source listing many identity providers.
//! This crate keeps the realm's providers in line with that list:
//!
//! - [`diff`] computes add/update/remove sets after allow/deny filtering.
//! - [`FederationSynchronizer`] runs one fetch/diff/apply cycle.
//! - [`FederationManager`] owns federation lifecycle, mapper templates, and
//!   the per-federation sync task on the cluster-aware scheduler.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kc_federation::{FederationManager, FederationSynchronizer, StaticMetadataFetcher};
//!
//! let synchronizer = Arc::new(FederationSynchronizer::new(storage, registry, fetcher));
//! let manager = FederationManager::new(synchronizer, scheduler);
//! let federation = manager.add_federation(federation).await?;
//! let result = manager.sync_once(federation.realm_id, federation.id).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod diff;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod manager;
pub mod sync;

pub use diff::{FederationDiff, diff};
pub use error::{FederationError, FederationResult};
pub use fetch::{MetadataFetcher, StaticMetadataFetcher};
pub use manager::{FederationManager, FederationSyncTask, task_name};
pub use sync::{FederationSynchronizer, SyncError, SyncResult};
