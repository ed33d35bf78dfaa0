//! Automatic selection strategies.
//!
//! Each strategy is a pure function of the embedded artwork (if any) and
//! the ranked candidate list. They let a whole batch run unattended, or
//! clear every item parked in `AwaitingSelection` at once.

use serde::{Deserialize, Serialize};

use crate::model::{ArtworkCandidate, ArtworkInfo, Selection};

/// How to choose artwork without asking the operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Keep embedded artwork when present, else the top candidate
    PreferEmbedded,
    /// Top-ranked candidate; ties on rank go to the newest release
    PreferBestCandidate,
    /// Largest known pixel count, embedded artwork included
    HighestResolution,
    /// Smallest known byte size, embedded artwork included
    SmallestFile,
}

impl SelectionStrategy {
    pub const ALL: [SelectionStrategy; 4] = [
        SelectionStrategy::PreferEmbedded,
        SelectionStrategy::PreferBestCandidate,
        SelectionStrategy::HighestResolution,
        SelectionStrategy::SmallestFile,
    ];

    /// Pick artwork for one track. `candidates` must be ranked best first.
    pub fn select(self, embedded: Option<&ArtworkInfo>, candidates: &[ArtworkCandidate]) -> Selection {
        match self {
            SelectionStrategy::PreferEmbedded => prefer_embedded(embedded, candidates),
            SelectionStrategy::PreferBestCandidate => match best_candidate(candidates) {
                Some(c) => Selection::Candidate(c.id.clone()),
                None if embedded.is_some() => Selection::Embedded,
                None => Selection::Skip,
            },
            SelectionStrategy::HighestResolution => highest_resolution(embedded, candidates),
            SelectionStrategy::SmallestFile => smallest_file(embedded, candidates),
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SelectionStrategy::PreferEmbedded => "prefer-embedded",
            SelectionStrategy::PreferBestCandidate => "prefer-best-candidate",
            SelectionStrategy::HighestResolution => "highest-resolution",
            SelectionStrategy::SmallestFile => "smallest-file",
        };
        f.write_str(s)
    }
}

fn prefer_embedded(embedded: Option<&ArtworkInfo>, candidates: &[ArtworkCandidate]) -> Selection {
    if embedded.is_some() {
        Selection::Embedded
    } else if let Some(first) = candidates.first() {
        Selection::Candidate(first.id.clone())
    } else {
        Selection::Skip
    }
}

/// Among candidates sharing the top ranking key, the most recent release
/// date wins. Dates compare as ISO strings; unknown dates lose. Remaining
/// ties keep catalog order.
pub fn best_candidate(candidates: &[ArtworkCandidate]) -> Option<&ArtworkCandidate> {
    let top = candidates.first()?.score();
    let mut best: Option<&ArtworkCandidate> = None;
    for candidate in candidates.iter().filter(|c| c.score() == top) {
        best = match best {
            Some(current) if current.release_date >= candidate.release_date => Some(current),
            _ => Some(candidate),
        };
    }
    best
}

fn highest_resolution(embedded: Option<&ArtworkInfo>, candidates: &[ArtworkCandidate]) -> Selection {
    let embedded_pixels = embedded.map(ArtworkInfo::pixels).unwrap_or(0);

    // First candidate with the largest known size (ties keep rank order)
    let mut best: Option<&ArtworkCandidate> = None;
    for candidate in candidates.iter().filter(|c| c.pixels() > 0) {
        if best.is_none_or(|b| candidate.pixels() > b.pixels()) {
            best = Some(candidate);
        }
    }

    match best {
        Some(c) if c.pixels() > embedded_pixels => Selection::Candidate(c.id.clone()),
        _ if embedded.is_some() => Selection::Embedded,
        _ => prefer_embedded(None, candidates),
    }
}

fn smallest_file(embedded: Option<&ArtworkInfo>, candidates: &[ArtworkCandidate]) -> Selection {
    let mut best: Option<&ArtworkCandidate> = None;
    for candidate in candidates.iter().filter(|c| c.byte_size.is_some()) {
        if best.is_none_or(|b| candidate.byte_size < b.byte_size) {
            best = Some(candidate);
        }
    }

    match (embedded, best) {
        (Some(info), Some(c)) if c.byte_size.is_some_and(|size| size < info.byte_size) => {
            Selection::Candidate(c.id.clone())
        }
        (Some(_), _) => Selection::Embedded,
        (None, Some(c)) => Selection::Candidate(c.id.clone()),
        (None, None) => prefer_embedded(None, candidates),
    }
}
