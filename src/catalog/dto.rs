//! Catalog API Data Transfer Objects
//!
//! These types match what the MusicBrainz release search and the Cover Art
//! Archive listing endpoints return. Only the fields we read are declared;
//! serde ignores the rest.
//! DO NOT use these types outside the catalog module - convert to domain
//! types in `adapter.rs`.
//!
//! API Reference:
//! - https://musicbrainz.org/doc/MusicBrainz_API/Search#Release
//! - https://wiki.musicbrainz.org/Cover_Art_Archive/API

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// MusicBrainz
// ============================================================================

/// Release search response (`/ws/2/release/?query=...&fmt=json`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseSearchResponse {
    /// Total hits on the server (not the page size)
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub releases: Vec<Release>,
}

/// Release search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Release {
    /// MusicBrainz release ID
    pub id: String,
    /// Search relevance, 0-100
    pub score: Option<u32>,
    /// Release title
    pub title: String,
    /// Release status (Official, Bootleg, etc.)
    pub status: Option<String>,
    /// Release date (YYYY, YYYY-MM, or YYYY-MM-DD)
    pub date: Option<String>,
    /// Country code
    pub country: Option<String>,
    /// Artist credits
    #[serde(default)]
    pub artist_credit: Vec<ArtistCredit>,
}

/// Artist credit (can be multiple for collaborations)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    /// The artist
    pub artist: Artist,
    /// How this artist is credited (may differ from official name)
    pub name: Option<String>,
    /// Join phrase (e.g., " & ", " feat. ")
    pub joinphrase: Option<String>,
}

/// Artist info
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Error response from MusicBrainz API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: String,
    pub help: Option<String>,
}

// ============================================================================
// Cover Art Archive
// ============================================================================

/// Cover art listing for a release (`/release/{mbid}`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoverArtResponse {
    /// Array of images for this release
    #[serde(default)]
    pub images: Vec<Image>,
    /// URL of the release on MusicBrainz
    pub release: Option<String>,
}

/// A single cover art image
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    /// Image ID (a number in current responses, a string in older ones)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Whether this is the front cover
    #[serde(default)]
    pub front: bool,
    /// Whether this is the back cover
    #[serde(default)]
    pub back: bool,
    /// Image types (Front, Back, Booklet, etc.)
    #[serde(default)]
    pub types: Vec<String>,
    /// URL to full-size image
    pub image: String,
    /// Thumbnail URLs
    #[serde(default)]
    pub thumbnails: Thumbnails,
    /// Whether the edit adding this image has been approved
    #[serde(default)]
    pub approved: bool,
    /// Comment about the image
    pub comment: Option<String>,
}

/// Available thumbnail sizes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Thumbnails {
    /// 250px thumbnail
    #[serde(rename = "250")]
    pub small: Option<String>,
    /// 500px thumbnail
    #[serde(rename = "500")]
    pub large: Option<String>,
    /// 1200px thumbnail (if available)
    #[serde(rename = "1200")]
    pub xlarge: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

// ============================================================================
// CONTRACT TESTS
// These verify our DTOs match what the real API returns.
// If these fail, the API has changed and we need to update our DTOs.
// ============================================================================
