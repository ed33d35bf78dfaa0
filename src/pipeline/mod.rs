//! Per-track processing state machine.
//!
//! ```text
//! Pending → Analyzing → SearchingArtwork ─┬─────────────────────┬→ Optimizing → Embedding → Completed
//!               │                         └→ AwaitingSelection ─┘       │            │
//!               └→ Failed                                               └→ Failed ←──┘
//! ```
//!
//! [`ProcessingPipeline::advance`] performs exactly one transition. Each
//! transition is atomic from the caller's point of view: pause and cancel
//! are only observed between calls, so a tag read, an optimize or an
//! output write always runs to completion.

use std::sync::Arc;

use tokio::task;

use crate::artwork::{self, ArtworkOptimizer};
use crate::catalog::CatalogApi;
use crate::config::{Config, ResolverConfig};
use crate::error::Classify;
use crate::metadata::{TagError, TagIo};
use crate::model::{
    ArtworkImage, ErrorCategory, ErrorRecord, Selection, Severity, TrackItem, TrackStatus,
};
use crate::output::{CommitError, OutputDir, OutputError};
use crate::resolver::{ArtworkResolver, Resolution, SelectionStrategy};

/// Result of one [`ProcessingPipeline::advance`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The item changed state (or was already terminal)
    Advanced,
    /// The item waits in `AwaitingSelection` for a decision
    Parked,
    /// The output destination is unusable; the whole job should stop
    Abort(ErrorRecord),
}

pub struct ProcessingPipeline {
    tags: Arc<dyn TagIo>,
    catalog: Arc<dyn CatalogApi>,
    resolver: ArtworkResolver,
    optimizer: ArtworkOptimizer,
    output: OutputDir,
}

impl ProcessingPipeline {
    pub fn new(
        tags: Arc<dyn TagIo>,
        catalog: Arc<dyn CatalogApi>,
        optimizer: ArtworkOptimizer,
        resolver_config: ResolverConfig,
        output: OutputDir,
    ) -> Self {
        let resolver = ArtworkResolver::new(catalog.clone(), optimizer.clone(), resolver_config);
        Self {
            tags,
            catalog,
            resolver,
            optimizer,
            output,
        }
    }

    pub fn from_config(config: &Config, tags: Arc<dyn TagIo>, catalog: Arc<dyn CatalogApi>) -> Self {
        Self::new(
            tags,
            catalog,
            ArtworkOptimizer::new(config.artwork.clone()),
            config.resolver.clone(),
            OutputDir::from_config(&config.output),
        )
    }

    pub fn output(&self) -> &OutputDir {
        &self.output
    }

    /// Perform the next transition for `item`.
    ///
    /// `auto` selects artwork as soon as candidates are found instead of
    /// parking the item.
    pub async fn advance(&self, item: &mut TrackItem, auto: Option<SelectionStrategy>) -> Step {
        match item.status {
            TrackStatus::Pending => {
                item.status = TrackStatus::Analyzing;
                Step::Advanced
            }
            TrackStatus::Analyzing => {
                self.analyze(item).await;
                Step::Advanced
            }
            TrackStatus::SearchingArtwork => {
                self.search(item, auto).await;
                Step::Advanced
            }
            TrackStatus::AwaitingSelection => {
                if Self::take_selection(item) {
                    Step::Advanced
                } else {
                    Step::Parked
                }
            }
            TrackStatus::Optimizing => {
                self.prepare_artwork(item).await;
                Step::Advanced
            }
            TrackStatus::Embedding => self.embed(item).await,
            TrackStatus::Completed | TrackStatus::Failed | TrackStatus::Cancelled => Step::Advanced,
        }
    }

    /// Leave `AwaitingSelection` once a selection is present. Returns
    /// whether the item moved.
    pub fn take_selection(item: &mut TrackItem) -> bool {
        if item.status != TrackStatus::AwaitingSelection || item.selection.is_none() {
            return false;
        }
        item.status = TrackStatus::Optimizing;
        true
    }

    /// Drive an item until it is terminal or parked.
    pub async fn run(&self, item: &mut TrackItem, auto: Option<SelectionStrategy>) -> Step {
        while !item.status.is_terminal() {
            match self.advance(item, auto).await {
                Step::Advanced => {}
                other => return other,
            }
        }
        Step::Advanced
    }

    async fn analyze(&self, item: &mut TrackItem) {
        let tags = self.tags.clone();
        let path = item.source_path.clone();

        let result = task::spawn_blocking(move || {
            let tags = tags.read(&path)?;
            let artwork = tags.artwork.map(|bytes| {
                artwork::inspect(&bytes).map(|info| ArtworkImage::new(info, bytes))
            });
            Ok::<_, TagError>((tags.metadata, artwork))
        })
        .await;

        match result {
            Ok(Ok((metadata, artwork))) => {
                item.metadata = metadata;
                match artwork {
                    Some(Ok(image)) => item.current_artwork = Some(image),
                    Some(Err(e)) => item.warn(
                        ErrorRecord::new(
                            ErrorCategory::FileError,
                            Severity::Low,
                            format!("Embedded artwork ignored: {e}"),
                        )
                        .with_user_message("The existing artwork could not be read and was ignored"),
                    ),
                    None => {}
                }
                tracing::debug!("Analyzed {}: {:?}", item.file_name(), item.metadata);
                item.status = TrackStatus::SearchingArtwork;
            }
            Ok(Err(e)) => item.fail(e.to_record()),
            Err(e) => item.fail(join_failure(e)),
        }
    }

    async fn search(&self, item: &mut TrackItem, auto: Option<SelectionStrategy>) {
        let resolution = self
            .resolver
            .resolve(&item.metadata, &item.source_path, item.current_artwork.as_ref())
            .await;

        match resolution {
            Resolution::KeepEmbedded | Resolution::OptimizeEmbedded => {
                item.selection = Some(Selection::Embedded);
                item.status = TrackStatus::Optimizing;
            }
            Resolution::Candidates(candidates) => {
                item.candidates = candidates;
                match auto {
                    Some(strategy) => {
                        let embedded = item.current_artwork.as_ref().map(|a| &a.info);
                        let selection = strategy.select(embedded, &item.candidates);
                        tracing::info!("{}: {} chose {:?}", item.file_name(), strategy, selection);
                        item.selection = Some(selection);
                        item.status = TrackStatus::Optimizing;
                    }
                    None => item.status = TrackStatus::AwaitingSelection,
                }
            }
            Resolution::NoArtwork(warning) => {
                item.warn(warning);
                item.selection = Some(if item.current_artwork.is_some() {
                    Selection::Embedded
                } else {
                    Selection::Skip
                });
                item.status = TrackStatus::Optimizing;
            }
        }
    }

    /// Turn the selection into the artwork to embed (`item.prepared`).
    async fn prepare_artwork(&self, item: &mut TrackItem) {
        item.prepared = None;

        let source = match item.selection.clone() {
            None | Some(Selection::Skip) => None,
            Some(Selection::Embedded) => match item.current_artwork {
                Some(ref art) if self.optimizer.meets_contract(&art.info) => None,
                Some(ref art) => Some(art.clone()),
                None => None,
            },
            Some(Selection::Candidate(id)) => self.download(item, &id).await,
        };
        if item.status == TrackStatus::Failed {
            return;
        }

        if let Some(source) = source {
            let optimizer = self.optimizer.clone();
            let result = task::spawn_blocking(move || optimizer.optimize(source.bytes())).await;
            match result {
                Ok(Ok(image)) => {
                    tracing::debug!(
                        "{}: artwork optimized to {}x{} ({} bytes)",
                        item.file_name(),
                        image.info.width,
                        image.info.height,
                        image.info.byte_size
                    );
                    item.prepared = Some(image);
                }
                Ok(Err(e)) => {
                    item.fail(e.to_record());
                    return;
                }
                Err(e) => {
                    item.fail(join_failure(e));
                    return;
                }
            }
        }

        item.status = TrackStatus::Embedding;
    }

    /// Fetch a candidate. Failures degrade to "no new artwork".
    async fn download(&self, item: &mut TrackItem, id: &str) -> Option<ArtworkImage> {
        let Some(candidate) = item.candidate(id).cloned() else {
            item.warn(ErrorRecord::new(
                ErrorCategory::ApiError,
                Severity::Medium,
                format!("Selected candidate {id} is not in the result list"),
            ));
            return None;
        };

        let bytes = match self.catalog.fetch(&candidate).await {
            Ok(bytes) => bytes,
            Err(e) => {
                item.warn(
                    e.to_record()
                        .with_user_message("Artwork download failed; the file was kept without new artwork"),
                );
                return None;
            }
        };

        // Record what was actually downloaded
        match artwork::inspect(&bytes) {
            Ok(info) => {
                if let Some(c) = item.candidates.iter_mut().find(|c| c.id == id) {
                    c.width = Some(info.width);
                    c.height = Some(info.height);
                    c.byte_size = Some(info.byte_size);
                }
                Some(ArtworkImage::new(info, bytes))
            }
            Err(e) => {
                item.fail(e.to_record());
                None
            }
        }
    }

    async fn embed(&self, item: &mut TrackItem) -> Step {
        let dest = self.output.unique_path(&item.metadata, &item.source_path);
        let tags = self.tags.clone();
        let output = self.output.clone();
        let source = item.source_path.clone();
        let artwork = item.prepared.clone();
        let target = dest.clone();

        let result = task::spawn_blocking(move || {
            output.commit(&target, |part| {
                tags.write_with_artwork(&source, part, artwork.as_ref())
            })
        })
        .await;

        let record = match result {
            Ok(Ok(())) => {
                tracing::info!("Completed {} -> {}", item.file_name(), dest.display());
                item.output_path = Some(dest);
                item.prepared = None;
                item.status = TrackStatus::Completed;
                return Step::Advanced;
            }
            Ok(Err(CommitError::Write(TagError::Write(message)))) => {
                OutputError::Write(dest, message).to_record()
            }
            Ok(Err(CommitError::Write(e))) => e.to_record(),
            Ok(Err(CommitError::Output(e))) => e.to_record(),
            Err(e) => join_failure(e),
        };
        item.fail(record);

        self.check_destination()
    }

    /// After a write failure, decide whether the destination itself is gone.
    fn check_destination(&self) -> Step {
        match self.output.ensure_ready() {
            Ok(()) => Step::Advanced,
            Err(e) => Step::Abort(e.to_record()),
        }
    }
}

fn join_failure(e: task::JoinError) -> ErrorRecord {
    ErrorRecord::new(
        ErrorCategory::SystemError,
        Severity::Critical,
        format!("Worker task failed: {e}"),
    )
}
