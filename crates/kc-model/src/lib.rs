//! # kc-model
//!
//! Domain models for realms and the resources they own.
//!
//! This crate defines the entities the bootstrap orchestrator and the
//! federation synchronizer operate on: realms, clients, roles, identity
//! providers and their mappers, federations with their filters and mapper
//! templates, and the provider descriptors a metadata fetch returns.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod client;
pub mod descriptor;
pub mod federation;
pub mod identity_provider;
pub mod realm;
pub mod role;

pub use client::{Client, ClientAccess};
pub use descriptor::{FetchedMetadata, ProviderDescriptor};
pub use federation::{
    CategoryMap, FederationMapper, FilterSet, IdentityProviderFederation, ProviderDefaults,
};
pub use identity_provider::{IdentityProvider, IdentityProviderMapper};
pub use realm::Realm;
pub use role::Role;
