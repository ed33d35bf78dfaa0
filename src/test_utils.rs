//! Test utilities and fixtures for artwork-minder tests.
//!
//! Image fixtures are generated in memory with the `image` crate; noise
//! images are seeded so sizes are reproducible across runs.
//!
//! # Example
//!
//! ```ignore
//! use artwork_minder::test_utils::{noise_jpeg, mock_candidate};
//!
//! let cover = noise_jpeg(800, 800, 95, 1); // > 500 KB
//! let candidate = mock_candidate("front", true, true, Some(1000));
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

use crate::metadata::TrackTags;
use crate::model::{ArtworkCandidate, TrackMetadata};

/// Random-noise JPEG. Noise defeats compression, so an 800×800 image at
/// quality 95 is well over 500 KB.
pub fn noise_jpeg(width: u32, height: u32, quality: u8, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let img = RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.random(), rng.random(), rng.random()])
    });

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&DynamicImage::ImageRgb8(img))
        .expect("Failed to encode JPEG fixture");
    buf
}

/// Random-noise PNG with a varying alpha channel.
pub fn noise_png_rgba(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let img = RgbaImage::from_fn(width, height, |_, _| {
        Rgba([rng.random(), rng.random(), rng.random(), rng.random()])
    });
    encode_png(DynamicImage::ImageRgba8(img))
}

/// Single-colour RGBA PNG; compresses to almost nothing.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    encode_png(DynamicImage::ImageRgba8(img))
}

fn encode_png(img: DynamicImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    cursor.into_inner()
}

/// Catalog candidate with sensible defaults.
///
/// `size` sets both width and height (square artwork).
pub fn mock_candidate(id: &str, front: bool, approved: bool, size: Option<u32>) -> ArtworkCandidate {
    ArtworkCandidate {
        id: id.to_string(),
        source_url: format!("https://coverartarchive.org/release/rel-{id}/{id}.jpg"),
        thumbnail_url: Some(format!(
            "https://coverartarchive.org/release/rel-{id}/{id}-500.jpg"
        )),
        release_id: format!("rel-{id}"),
        release_title: "Test Album".to_string(),
        release_artist: "Test Artist".to_string(),
        release_date: None,
        width: size,
        height: size,
        byte_size: None,
        is_front_cover: front,
        is_approved: approved,
    }
}

/// Tags for a track with the given fields and optional embedded artwork.
pub fn mock_tags(
    artist: Option<&str>,
    album: Option<&str>,
    title: Option<&str>,
    artwork: Option<Vec<u8>>,
) -> TrackTags {
    TrackTags {
        metadata: TrackMetadata::new(artist, album, title),
        artwork,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_jpeg_is_deterministic() {
        assert_eq!(noise_jpeg(32, 32, 90, 4), noise_jpeg(32, 32, 90, 4));
    }

    #[test]
    fn test_oversized_fixture() {
        assert!(noise_jpeg(800, 800, 95, 1).len() > 500 * 1024);
    }

    #[test]
    fn test_mock_candidate_defaults() {
        let c = mock_candidate("a", true, false, Some(1000));
        assert_eq!(c.pixels(), 1_000_000);
        assert!(c.is_front_cover);
        assert!(!c.is_approved);
    }
}
