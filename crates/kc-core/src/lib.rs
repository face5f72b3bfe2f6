//! # kc-core
//!
//! Core utilities, configuration, and error handling shared by the realm
//! bootstrap and federation crates.
//!
//! This crate provides the error taxonomy every other crate maps into, the
//! process configuration tree, and the model-event observer chain that
//! replaces listener fan-out.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
