//! Error classification.
//!
//! Library modules use specific error types via `thiserror`, while the
//! CLI uses `anyhow` for convenient error propagation. [`Classify`] maps a
//! module error onto the per-item [`ErrorRecord`] taxonomy
//! (category + severity).
//!
//! # Example
//!
//! ```ignore
//! use artwork_minder::error::Classify;
//!
//! match optimizer.optimize(&bytes) {
//!     Ok(image) => item.prepared = Some(image),
//!     Err(e) => item.fail(e.to_record()),
//! }
//! ```

use crate::artwork::ArtworkError;
use crate::catalog::CatalogError;
use crate::metadata::TagError;
use crate::model::{ErrorCategory, ErrorRecord, Severity};
use crate::output::OutputError;

/// Places an error in the per-item error taxonomy.
pub trait Classify: std::fmt::Display {
    fn category(&self) -> ErrorCategory;
    fn severity(&self) -> Severity;

    /// Build the record stored on a track.
    fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(self.category(), self.severity(), self.to_string())
    }
}

impl Classify for TagError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileError
    }

    fn severity(&self) -> Severity {
        Severity::High
    }
}

impl Classify for ArtworkError {
    fn category(&self) -> ErrorCategory {
        match self {
            ArtworkError::Decode(_) | ArtworkError::Unsupported(_) => ErrorCategory::FileError,
            ArtworkError::Encode(_) => ErrorCategory::SystemError,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ArtworkError::Decode(_) | ArtworkError::Unsupported(_) => Severity::High,
            ArtworkError::Encode(_) => Severity::Critical,
        }
    }
}

impl Classify for CatalogError {
    fn category(&self) -> ErrorCategory {
        match self {
            CatalogError::Network { .. } | CatalogError::RateLimited => {
                ErrorCategory::NetworkError
            }
            CatalogError::Api { .. }
            | CatalogError::Parse(_)
            | CatalogError::InvalidResponse(_) => ErrorCategory::ApiError,
        }
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }
}

impl Classify for OutputError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::SystemError
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
