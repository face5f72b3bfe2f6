//! # kc-realm
//!
//! Realm bootstrap and lifecycle.
//!
//! Every realm needs a fixed set of default clients and roles before it is
//! usable. [`BootstrapOrchestrator`] creates them in dependency order,
//! postponing any resource whose dependency an import has yet to provide,
//! and verifies resources that already exist so older realms pick up roles
//! added to the default set since.
//!
//! [`RealmManager`] wraps the orchestrator with realm creation, import, and
//! removal, keeping the federation sync schedule in step.
//!
//! ## Example
//!
//! ```ignore
//! use kc_realm::RealmManager;
//!
//! let manager = RealmManager::new(storage, &config.bootstrap);
//! manager.create_realm(None, "master").await?;
//! let acme = manager.create_realm(None, "acme").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bootstrap;
pub mod composite;
pub mod defaults;
pub mod error;
pub mod import;
pub mod manager;
pub mod registry;

mod steps;

pub use bootstrap::{BootstrapOrchestrator, BootstrapReport};
pub use error::{BootstrapError, BootstrapResult};
pub use import::{
    ClientDocument, DocumentImport, FederationDocument, ImportStage, KnownFromImport,
    MapperDocument, RealmDocument, RoleDocument, RolesDocument,
};
pub use manager::RealmManager;
pub use registry::{DEFAULT_RESOURCES, DefaultResource, Dependency};
