//! End-to-End Integration Tests
//!
//! These tests drive realm bootstrap, federation sync, and the cluster-aware
//! scheduler together, with several nodes sharing one store and one lease
//! table.

mod bootstrap;
mod common;
mod federation_sync;
mod scheduling;
