//! External artwork catalog: MusicBrainz release search plus the Cover Art
//! Archive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ SearchQuery  │──▶│ CatalogClient │──▶│ HttpTransport│──▶ network
//! └──────────────┘   │  RateLimiter  │   └──────────────┘
//!                    │  RetryPolicy  │
//!                    └───────┬───────┘
//!                            │ dto ──▶ adapter ──▶ ArtworkCandidate
//! ```
//!
//! MusicBrainz requires a User-Agent and at most one request per second.

mod adapter;
mod client;
pub mod dto;
pub mod rate_limit;
pub mod traits;
pub mod transport;

pub use client::CatalogClient;
pub use rate_limit::{RateLimiter, RetryPolicy};
pub use traits::CatalogApi;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};

use serde::{Deserialize, Serialize};

/// Catalog failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Transient failures persisted through every retry
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    /// The server kept answering 429
    #[error("Rate limited - try again later")]
    RateLimited,

    /// Request rejected (4xx other than 429)
    #[error("API request failed (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

/// What to search the catalog for. Title is always present; the search
/// strategies in the resolver decide which other fields are filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub artist: String,
    pub album: Option<String>,
    pub title: String,
}

impl SearchQuery {
    pub fn new(artist: &str, album: Option<&str>, title: &str) -> Self {
        Self {
            artist: artist.trim().to_string(),
            album: album.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            title: title.trim().to_string(),
        }
    }

    /// Lucene query for the MusicBrainz release index.
    pub fn to_lucene(&self) -> String {
        let mut parts = vec![format!("artist:\"{}\"", escape_phrase(&self.artist))];
        if let Some(ref album) = self.album {
            parts.push(format!("release:\"{}\"", escape_phrase(album)));
        }
        parts.push(format!("recording:\"{}\"", escape_phrase(&self.title)));
        parts.join(" AND ")
    }
}

/// Escape characters that would end or break a quoted Lucene phrase.
fn escape_phrase(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
