//! # kc-spi
//!
//! Service Provider Interface (SPI) registry for identity provider types and
//! identity provider mapper types.
//!
//! ## Design
//!
//! Provider types are resolved through an explicit registry populated at
//! process start instead of dynamic discovery:
//! - [`IdentityProviderFactory`] - validates and fills defaults for one provider type
//! - [`IdentityProviderMapperFactory`] - validates one mapper type
//! - [`ProviderTypeRegistry`] - exact-match lookup by type id

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod builtin;
pub mod provider;
pub mod registry;

pub use provider::{
    IdentityProviderFactory, IdentityProviderMapperFactory, ProviderMetadata, Spi, SpiError,
};
pub use registry::ProviderTypeRegistry;
