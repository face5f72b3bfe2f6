//! Metadata retrieval.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use kc_model::{FetchedMetadata, ProviderDescriptor};

use crate::error::{FederationError, FederationResult};

/// Retrieves and parses a federation's metadata document.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetches the descriptor list published at `url`.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::Fetch` if the source is unreachable or the
    /// document cannot be parsed.
    async fn fetch(&self, url: &str) -> FederationResult<FetchedMetadata>;
}

/// Fetcher serving documents registered in memory.
///
/// Used for tests and for seeding federations without a remote source.
#[derive(Debug, Default)]
pub struct StaticMetadataFetcher {
    documents: DashMap<String, Result<FetchedMetadata, String>>,
    calls: AtomicUsize,
}

impl StaticMetadataFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `metadata` for `url`.
    pub fn set(&self, url: impl Into<String>, metadata: FetchedMetadata) {
        self.documents.insert(url.into(), Ok(metadata));
    }

    /// Serves a descriptor list without validity for `url`.
    pub fn set_descriptors(&self, url: impl Into<String>, descriptors: Vec<ProviderDescriptor>) {
        self.set(url, FetchedMetadata::new(descriptors));
    }

    /// Makes fetches of `url` fail with `reason`.
    pub fn fail(&self, url: impl Into<String>, reason: impl Into<String>) {
        self.documents.insert(url.into(), Err(reason.into()));
    }

    /// Number of fetches served so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for StaticMetadataFetcher {
    async fn fetch(&self, url: &str) -> FederationResult<FetchedMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.documents.get(url).as_deref() {
            Some(Ok(metadata)) => Ok(metadata.clone()),
            Some(Err(reason)) => Err(FederationError::fetch(url, reason.clone())),
            None => Err(FederationError::fetch(url, "no document registered")),
        }
    }
}
