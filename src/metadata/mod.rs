//! Track tag reading and artwork embedding.
//!
//! Uses the lofty crate for format-independent tag access (ID3v2 for MP3,
//! Vorbis comments for FLAC/OGG, MP4 atoms for M4A).
//!
//! The pipeline talks to tags only through the [`TagIo`] trait so tests
//! can substitute [`mocks::MockTags`]. All calls are synchronous; async
//! callers wrap them in `spawn_blocking`.

pub mod filename;

pub use filename::{FilenameGuess, parse_filename};

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};
use std::path::Path;

use crate::model::{ArtworkFormat, ArtworkImage, TrackMetadata};

/// Errors from reading or writing track tags.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TagError {
    /// File missing or unreadable
    #[error("Failed to open {0}")]
    Open(String),

    /// Not a recognised audio container, or a corrupt one
    #[error("Unsupported or corrupt track: {0}")]
    Unsupported(String),

    /// Tags could not be written back
    #[error("Failed to write tags: {0}")]
    Write(String),
}

/// What a track's tags say about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub metadata: TrackMetadata,
    /// Raw bytes of the embedded front cover (or first picture)
    pub artwork: Option<Vec<u8>>,
}

/// Tag reader/writer used by the pipeline.
pub trait TagIo: Send + Sync {
    /// Read metadata and embedded artwork. Missing tags are not errors.
    fn read(&self, path: &Path) -> Result<TrackTags, TagError>;

    /// Copy `source` to `dest` and, when `artwork` is given, replace the
    /// front cover in the copy. `source` is never modified.
    fn write_with_artwork(
        &self,
        source: &Path,
        dest: &Path,
        artwork: Option<&ArtworkImage>,
    ) -> Result<(), TagError>;
}

/// [`TagIo`] backed by lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTags;

impl TagIo for LoftyTags {
    fn read(&self, path: &Path) -> Result<TrackTags, TagError> {
        read(path)
    }

    fn write_with_artwork(
        &self,
        source: &Path,
        dest: &Path,
        artwork: Option<&ArtworkImage>,
    ) -> Result<(), TagError> {
        write_with_artwork(source, dest, artwork)
    }
}

/// Read tag metadata and the embedded cover from a track.
pub fn read(path: &Path) -> Result<TrackTags, TagError> {
    // Probe the file to determine format and read tags
    let tagged_file = Probe::open(path)
        .map_err(|e| TagError::Open(format!("{}: {}", path.display(), e)))?
        .read()
        .map_err(|e| TagError::Unsupported(format!("{}: {}", path.display(), e)))?;

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        tracing::debug!("No tags in {:?}", path);
        return Ok(TrackTags::default());
    };

    let metadata = TrackMetadata::new(
        tag.artist().as_deref(),
        tag.album().as_deref(),
        tag.title().as_deref(),
    );

    // Prefer front cover, fall back to first picture
    let pictures = tag.pictures();
    let artwork = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|p| p.data().to_vec());

    Ok(TrackTags { metadata, artwork })
}

/// Copy a track and embed new front-cover artwork into the copy.
pub fn write_with_artwork(
    source: &Path,
    dest: &Path,
    artwork: Option<&ArtworkImage>,
) -> Result<(), TagError> {
    std::fs::copy(source, dest)
        .map_err(|e| TagError::Write(format!("copy to {}: {}", dest.display(), e)))?;

    let Some(artwork) = artwork else {
        return Ok(());
    };

    // `dest` may be a staging name without the track's extension
    let mut tagged_file = Probe::open(dest)
        .map_err(|e| TagError::Open(format!("{}: {}", dest.display(), e)))?
        .guess_file_type()
        .map_err(|e| TagError::Open(format!("{}: {}", dest.display(), e)))?
        .read()
        .map_err(|e| TagError::Unsupported(format!("{}: {}", dest.display(), e)))?;

    // Get the primary tag type for this format, or create one
    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| TagError::Write(format!("format does not support {tag_type:?} tags")))?;

    let mime = match artwork.info.format {
        ArtworkFormat::Png => MimeType::Png,
        _ => MimeType::Jpeg,
    };
    let picture = Picture::new_unchecked(
        PictureType::CoverFront,
        Some(mime),
        None,
        artwork.bytes().to_vec(),
    );

    tag.remove_picture_type(PictureType::CoverFront);
    tag.push_picture(picture);

    tag.save_to_path(dest, WriteOptions::default())
        .map_err(|e| TagError::Write(format!("{}: {}", dest.display(), e)))?;

    Ok(())
}
