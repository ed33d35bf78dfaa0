//! Trait definition for the catalog.
//!
//! The resolver and pipeline depend on [`CatalogApi`], not on
//! [`CatalogClient`](super::CatalogClient), so tests can substitute
//! [`mocks::MockCatalog`].

use async_trait::async_trait;

use super::{CatalogError, SearchQuery};
use crate::model::ArtworkCandidate;

/// Artwork search and download.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Search for artwork candidates. Order is the catalog's own.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ArtworkCandidate>, CatalogError>;

    /// Download the image of a candidate.
    async fn fetch(&self, candidate: &ArtworkCandidate) -> Result<Vec<u8>, CatalogError>;
}

#[async_trait]
impl CatalogApi for super::CatalogClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ArtworkCandidate>, CatalogError> {
        self.search(query).await
    }

    async fn fetch(&self, candidate: &ArtworkCandidate) -> Result<Vec<u8>, CatalogError> {
        self.fetch(candidate).await
    }
}
