//! # kc-storage
//!
//! Storage abstraction traits for realms and everything they own.
//!
//! This crate defines the persistence interfaces the bootstrap orchestrator
//! and the federation synchronizer talk to, plus an in-memory backend used
//! by tests and single-node deployments.
//!
//! ## Provider Traits
//!
//! - [`RealmProvider`] - CRUD operations for realms (delete cascades)
//! - [`ClientProvider`] - CRUD operations for clients
//! - [`RoleProvider`] - CRUD operations for roles and composite edges
//! - [`IdentityProviderProvider`] - CRUD operations for identity providers
//! - [`IdentityProviderMapperProvider`] - CRUD operations for provider mappers
//! - [`IdpFederationProvider`] - federations and their mapper templates

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::sync::Arc;

pub mod client;
pub mod error;
pub mod federation;
pub mod identity_provider;
pub mod memory;
pub mod realm;
pub mod role;

pub use client::ClientProvider;
pub use error::{StorageError, StorageResult};
pub use federation::IdpFederationProvider;
pub use identity_provider::{Detachment, IdentityProviderMapperProvider, IdentityProviderProvider};
pub use memory::MemoryStore;
pub use realm::RealmProvider;
pub use role::RoleProvider;

/// Aggregate of every storage provider, passed explicitly to orchestration code.
#[derive(Clone)]
pub struct Storage {
    /// Realm provider.
    pub realms: Arc<dyn RealmProvider>,
    /// Client provider.
    pub clients: Arc<dyn ClientProvider>,
    /// Role provider.
    pub roles: Arc<dyn RoleProvider>,
    /// Identity provider provider.
    pub identity_providers: Arc<dyn IdentityProviderProvider>,
    /// Identity provider mapper provider.
    pub idp_mappers: Arc<dyn IdentityProviderMapperProvider>,
    /// Federation provider.
    pub federations: Arc<dyn IdpFederationProvider>,
}

impl Storage {
    /// Creates storage backed by a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Creates storage backed by an existing in-memory store.
    #[must_use]
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            realms: store.clone(),
            clients: store.clone(),
            roles: store.clone(),
            identity_providers: store.clone(),
            idp_mappers: store.clone(),
            federations: store,
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
