//! Artwork resolver - decides where a track's artwork comes from.
//!
//! Resolution order:
//! 1. Embedded artwork that already meets the contract is kept as is
//! 2. Embedded artwork that can be optimized is optimized (no search),
//!    unless `search_when_noncompliant` is set
//! 3. Otherwise the catalog is searched with progressively looser queries
//!    and the results are ranked
//!
//! Catalog failures never fail the track: they come back as a
//! [`Resolution::NoArtwork`] carrying the warning to record.

pub mod strategy;

pub use strategy::{SelectionStrategy, best_candidate};

use std::path::Path;
use std::sync::Arc;

use crate::artwork::ArtworkOptimizer;
use crate::catalog::{CatalogApi, SearchQuery};
use crate::config::ResolverConfig;
use crate::error::Classify;
use crate::metadata::parse_filename;
use crate::model::{ArtworkCandidate, ArtworkImage, ErrorCategory, ErrorRecord, Severity, TrackMetadata};

/// How a search query is built from what we know about a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// artist + album + title from tags
    ArtistAlbumTitle,
    /// artist + title from tags
    ArtistTitle,
    /// artist + title parsed from the file name
    Filename,
}

impl QueryStrategy {
    /// Order in which strategies are tried.
    pub const ORDER: [QueryStrategy; 3] = [
        QueryStrategy::ArtistAlbumTitle,
        QueryStrategy::ArtistTitle,
        QueryStrategy::Filename,
    ];

    /// Build the query, or `None` when required fields are missing.
    pub fn build(self, metadata: &TrackMetadata, source_path: &Path) -> Option<SearchQuery> {
        match self {
            QueryStrategy::ArtistAlbumTitle => {
                let artist = metadata.artist.as_deref()?;
                let album = metadata.album.as_deref()?;
                let title = metadata.title.as_deref()?;
                Some(SearchQuery::new(artist, Some(album), title))
            }
            QueryStrategy::ArtistTitle => {
                let artist = metadata.artist.as_deref()?;
                let title = metadata.title.as_deref()?;
                Some(SearchQuery::new(artist, None, title))
            }
            QueryStrategy::Filename => {
                let name = source_path.file_name()?.to_string_lossy();
                let guess = parse_filename(&name)?;
                Some(SearchQuery::new(&guess.artist, None, &guess.title))
            }
        }
    }
}

/// State of the artwork already embedded in a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedState {
    Missing,
    Compliant,
    /// Decodable but outside the contract
    NonCompliant,
}

/// Outcome of resolving one track.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Embedded artwork already meets the contract
    KeepEmbedded,
    /// Embedded artwork needs optimizing; no search was made
    OptimizeEmbedded,
    /// Catalog candidates, ranked best first (never empty)
    Candidates(Vec<ArtworkCandidate>),
    /// Nothing usable found; the warning explains why
    NoArtwork(ErrorRecord),
}

/// Stable ranking: front cover, then approved, then resolution, all
/// descending. Ties keep catalog order.
pub fn rank(candidates: &mut [ArtworkCandidate]) {
    candidates.sort_by(|a, b| b.score().cmp(&a.score()));
}

pub struct ArtworkResolver {
    catalog: Arc<dyn CatalogApi>,
    optimizer: ArtworkOptimizer,
    config: ResolverConfig,
}

impl ArtworkResolver {
    pub fn new(catalog: Arc<dyn CatalogApi>, optimizer: ArtworkOptimizer, config: ResolverConfig) -> Self {
        Self {
            catalog,
            optimizer,
            config,
        }
    }

    pub fn assess(&self, current: Option<&ArtworkImage>) -> EmbeddedState {
        match current {
            None => EmbeddedState::Missing,
            Some(art) if self.optimizer.meets_contract(&art.info) => EmbeddedState::Compliant,
            Some(_) => EmbeddedState::NonCompliant,
        }
    }

    /// Decide where a track's artwork comes from.
    pub async fn resolve(
        &self,
        metadata: &TrackMetadata,
        source_path: &Path,
        current: Option<&ArtworkImage>,
    ) -> Resolution {
        match self.assess(current) {
            EmbeddedState::Compliant => return Resolution::KeepEmbedded,
            EmbeddedState::NonCompliant if !self.config.search_when_noncompliant => {
                return Resolution::OptimizeEmbedded;
            }
            _ => {}
        }

        self.search(metadata, source_path).await
    }

    /// Run the query strategies in order until one finds something.
    ///
    /// A strategy is skipped when its fields are missing, and the next one
    /// runs only after a search that returned zero results.
    pub async fn search(&self, metadata: &TrackMetadata, source_path: &Path) -> Resolution {
        let mut searched = false;

        for strategy in QueryStrategy::ORDER {
            let Some(query) = strategy.build(metadata, source_path) else {
                tracing::debug!("{:?}: not enough metadata, skipping", strategy);
                continue;
            };
            // Looser strategies can rebuild an identical query
            searched = true;

            match self.catalog.search(&query).await {
                Ok(mut candidates) if !candidates.is_empty() => {
                    rank(&mut candidates);
                    tracing::info!(
                        "{:?} found {} candidates for {}",
                        strategy,
                        candidates.len(),
                        source_path.display()
                    );
                    return Resolution::Candidates(candidates);
                }
                Ok(_) => {
                    tracing::debug!("{:?} found nothing for {}", strategy, source_path.display());
                }
                Err(e) => {
                    return Resolution::NoArtwork(
                        e.to_record()
                            .with_user_message("Artwork search failed; the file was kept without new artwork"),
                    );
                }
            }
        }

        let message = if searched {
            format!("No artwork found for {}", source_path.display())
        } else {
            format!(
                "Not enough metadata to search artwork for {}",
                source_path.display()
            )
        };
        Resolution::NoArtwork(
            ErrorRecord::new(ErrorCategory::ApiError, Severity::Medium, message)
                .with_user_message("No artwork found online for this file"),
        )
    }
}
