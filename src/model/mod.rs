//! Core data models for artwork processing.
//!
//! Defines the per-track unit of work ([`TrackItem`]) and the values that
//! flow through the pipeline: catalog candidates, the operator's
//! [`Selection`], and structured [`ErrorRecord`]s.
//!
//! These types are owned by the task manager's job; everything handed to
//! callers is a clone, so they derive `Clone` + `Serialize` for polling
//! layers that want JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque identifier of a track within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Processing state of a single track.
///
/// Transitions are driven by [`crate::pipeline::ProcessingPipeline`];
/// only `Cancelled` is ever written from outside the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackStatus {
    Pending,
    Analyzing,
    SearchingArtwork,
    AwaitingSelection,
    Optimizing,
    Embedding,
    Completed,
    Failed,
    Cancelled,
}

impl TrackStatus {
    pub const ALL: [TrackStatus; 9] = [
        TrackStatus::Pending,
        TrackStatus::Analyzing,
        TrackStatus::SearchingArtwork,
        TrackStatus::AwaitingSelection,
        TrackStatus::Optimizing,
        TrackStatus::Embedding,
        TrackStatus::Completed,
        TrackStatus::Failed,
        TrackStatus::Cancelled,
    ];

    /// Whether no further transitions happen without an explicit retry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TrackStatus::Completed | TrackStatus::Failed | TrackStatus::Cancelled
        )
    }

    /// Human-readable label for progress display.
    pub fn label(self) -> &'static str {
        match self {
            TrackStatus::Pending => "Pending",
            TrackStatus::Analyzing => "Analyzing",
            TrackStatus::SearchingArtwork => "Searching artwork",
            TrackStatus::AwaitingSelection => "Awaiting selection",
            TrackStatus::Optimizing => "Optimizing",
            TrackStatus::Embedding => "Embedding",
            TrackStatus::Completed => "Completed",
            TrackStatus::Failed => "Failed",
            TrackStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tag metadata relevant to artwork search. Absent tags stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
}

impl TrackMetadata {
    pub fn new(artist: Option<&str>, album: Option<&str>, title: Option<&str>) -> Self {
        Self {
            artist: clean_field(artist),
            album: clean_field(album),
            title: clean_field(title),
        }
    }
}

/// Normalise a tag value: trimmed, and blank values become unknown.
pub fn clean_field(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Image container format of a piece of artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtworkFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    WebP,
    Unknown,
}

impl ArtworkFormat {
    /// Formats the output contract accepts.
    pub fn is_accepted(self) -> bool {
        matches!(self, ArtworkFormat::Jpeg | ArtworkFormat::Png)
    }
}

/// Measured properties of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkInfo {
    pub format: ArtworkFormat,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub has_alpha: bool,
}

impl ArtworkInfo {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Image bytes together with their measured properties.
///
/// The bytes are shared so snapshots and item clones stay cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkImage {
    pub info: ArtworkInfo,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
}

impl ArtworkImage {
    pub fn new(info: ArtworkInfo, data: Vec<u8>) -> Self {
        Self {
            info,
            data: Arc::new(data),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for ArtworkImage {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && self.data == other.data
    }
}

/// One artwork option returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkCandidate {
    /// Catalog image id, unique within one search result
    pub id: String,
    /// Full-size image URL
    pub source_url: String,
    /// Preview URL (500px thumbnail when the catalog has one)
    pub thumbnail_url: Option<String>,
    pub release_id: String,
    pub release_title: String,
    pub release_artist: String,
    /// Release date as reported (YYYY, YYYY-MM or YYYY-MM-DD)
    pub release_date: Option<String>,
    /// Known only when the catalog reports it or after fetching
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub byte_size: Option<u64>,
    pub is_front_cover: bool,
    pub is_approved: bool,
}

impl ArtworkCandidate {
    /// Resolution in pixels, or 0 when unknown.
    pub fn pixels(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }

    /// Ranking key: front cover, then approval, then resolution.
    /// Larger keys rank first.
    pub fn score(&self) -> (bool, bool, u64) {
        (self.is_front_cover, self.is_approved, self.pixels())
    }
}

/// The artwork decision for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Use the candidate with this id
    Candidate(String),
    /// Keep (and optimize if needed) the artwork already embedded
    Embedded,
    /// Leave the track's artwork untouched
    Skip,
}

/// Error taxonomy used for per-item error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    FileError,
    NetworkError,
    ApiError,
    SystemError,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 4] = [
        ErrorCategory::FileError,
        ErrorCategory::NetworkError,
        ErrorCategory::ApiError,
        ErrorCategory::SystemError,
    ];

    /// Short, non-technical explanation shown to operators.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::FileError => "This file appears to be corrupted or is not supported",
            ErrorCategory::NetworkError => "Network connection problem while looking for artwork",
            ErrorCategory::ApiError => "Could not search for artwork online",
            ErrorCategory::SystemError => "Could not save the processed file",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::FileError => "file",
            ErrorCategory::NetworkError => "network",
            ErrorCategory::ApiError => "api",
            ErrorCategory::SystemError => "system",
        };
        f.write_str(s)
    }
}

/// Error severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Severities at or above this level fail the item.
    pub fn is_fatal(self) -> bool {
        self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A structured error or warning attached to a track.
///
/// Records are append-only; the only mutation is `retry_count` when the
/// owning item is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Full technical detail
    pub message: String,
    /// Short rendering for operators
    pub user_message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            user_message: category.user_message().to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    /// Emit the record through `tracing` at a level matching its severity.
    pub fn log(&self, source: &Path) {
        match self.severity {
            Severity::Critical | Severity::High => tracing::error!(
                "[{}] {} (file: {})",
                self.category,
                self.message,
                source.display()
            ),
            Severity::Medium => tracing::warn!(
                "[{}] {} (file: {})",
                self.category,
                self.message,
                source.display()
            ),
            Severity::Low => tracing::info!(
                "[{}] {} (file: {})",
                self.category,
                self.message,
                source.display()
            ),
        }
    }
}

/// One unit of work: a track moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackItem {
    pub id: TrackId,
    /// Input track, owned by the storage layer
    pub source_path: PathBuf,
    pub status: TrackStatus,
    pub metadata: TrackMetadata,
    pub current_artwork: Option<ArtworkImage>,
    /// Ranked best first
    pub candidates: Vec<ArtworkCandidate>,
    pub selection: Option<Selection>,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<ErrorRecord>,
    /// Set only on successful completion
    pub output_path: Option<PathBuf>,
    /// The error that moved the item to `Failed`; cleared on retry
    pub terminal_error: Option<ErrorRecord>,
    /// Optimized artwork waiting to be embedded (`None` = leave artwork as is)
    #[serde(skip)]
    pub prepared: Option<ArtworkImage>,
}

impl TrackItem {
    pub fn new(id: TrackId, source_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            status: TrackStatus::Pending,
            metadata: TrackMetadata::default(),
            current_artwork: None,
            candidates: Vec::new(),
            selection: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            output_path: None,
            terminal_error: None,
            prepared: None,
        }
    }

    /// File name for display and logs.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    /// Look up a candidate by id.
    pub fn candidate(&self, id: &str) -> Option<&ArtworkCandidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Record a fatal error and move to `Failed`.
    pub fn fail(&mut self, record: ErrorRecord) {
        record.log(&self.source_path);
        self.errors.push(record.clone());
        self.terminal_error = Some(record);
        self.status = TrackStatus::Failed;
    }

    /// Record a non-fatal problem; processing continues.
    pub fn warn(&mut self, record: ErrorRecord) {
        record.log(&self.source_path);
        self.warnings.push(record);
    }

    /// Reset a failed item so it re-enters the pipeline at `Pending`.
    ///
    /// Error history is kept for the audit log; each record's retry count
    /// goes up by one.
    pub fn reset_for_retry(&mut self) {
        for record in self.errors.iter_mut().chain(self.warnings.iter_mut()) {
            record.retry_count += 1;
        }
        self.status = TrackStatus::Pending;
        self.terminal_error = None;
        self.metadata = TrackMetadata::default();
        self.current_artwork = None;
        self.candidates.clear();
        self.selection = None;
        self.prepared = None;
        self.output_path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, front: bool, approved: bool, size: Option<u32>) -> ArtworkCandidate {
        ArtworkCandidate {
            id: id.to_string(),
            source_url: format!("http://example.com/{id}.jpg"),
            thumbnail_url: None,
            release_id: "rel".to_string(),
            release_title: "Album".to_string(),
            release_artist: "Artist".to_string(),
            release_date: None,
            width: size,
            height: size,
            byte_size: None,
            is_front_cover: front,
            is_approved: approved,
        }
    }

    #[test]
    fn test_metadata_blank_fields_are_unknown() {
        let meta = TrackMetadata::new(Some("  "), Some("Album"), None);
        assert_eq!(meta.artist, None);
        assert_eq!(meta.album.as_deref(), Some("Album"));
        assert_eq!(meta.title, None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::High.is_fatal());
        assert!(!Severity::Medium.is_fatal());
    }

    #[test]
    fn test_candidate_score_prefers_front_then_approved_then_size() {
        let front = candidate("a", true, false, Some(100));
        let approved = candidate("b", false, true, Some(2000));
        let big = candidate("c", false, false, Some(3000));
        assert!(front.score() > approved.score());
        assert!(approved.score() > big.score());
        assert_eq!(candidate("d", false, false, None).pixels(), 0);
    }

    #[test]
    fn test_fail_sets_terminal_error() {
        let mut item = TrackItem::new(TrackId(1), "/music/song.mp3");
        item.fail(ErrorRecord::new(
            ErrorCategory::FileError,
            Severity::High,
            "not an mp3",
        ));
        assert_eq!(item.status, TrackStatus::Failed);
        assert!(item.terminal_error.is_some());
        assert_eq!(item.errors.len(), 1);
    }

    #[test]
    fn test_reset_for_retry_keeps_history() {
        let mut item = TrackItem::new(TrackId(1), "/music/song.mp3");
        item.fail(ErrorRecord::new(
            ErrorCategory::FileError,
            Severity::High,
            "bad header",
        ));
        item.reset_for_retry();
        item.reset_for_retry();

        assert_eq!(item.status, TrackStatus::Pending);
        assert!(item.terminal_error.is_none());
        assert_eq!(item.errors.len(), 1);
        assert_eq!(item.errors[0].retry_count, 2);
    }

    #[test]
    fn test_error_record_user_message_defaults_to_category() {
        let record = ErrorRecord::new(ErrorCategory::NetworkError, Severity::Medium, "timeout");
        assert_eq!(record.user_message, ErrorCategory::NetworkError.user_message());
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_file_name() {
        let item = TrackItem::new(TrackId(7), "/music/Artist - Song.mp3");
        assert_eq!(item.file_name(), "Artist - Song.mp3");
        assert_eq!(item.id.to_string(), "#7");
    }
}
