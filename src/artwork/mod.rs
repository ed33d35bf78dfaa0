//! Artwork inspection and optimization.
//!
//! The optimizer turns arbitrary image bytes into bytes that satisfy the
//! artwork contract: both sides within the configured bounds (500×500 by
//! default), encoded size within the byte cap (500 KB), JPEG or PNG.
//!
//! # Algorithm
//!
//! 1. Images already inside the contract are returned unchanged, so
//!    `optimize(optimize(x)) == optimize(x)`.
//! 2. Oversized images are scaled so the longer side hits the bound
//!    (aspect preserved, no cropping) with Lanczos3.
//! 3. The result is encoded as JPEG, stepping quality down from
//!    `initial_quality` to `min_quality`; if the floor is still too big the
//!    dimensions shrink by `downscale_factor` and the quality loop repeats.
//! 4. PNG survives only for images with alpha when `preserve_alpha` is set
//!    and the PNG fits the cap. Otherwise alpha is flattened onto white.
//!
//! Everything here is CPU-bound and synchronous; the pipeline runs it in
//! `spawn_blocking`.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::config::ArtworkConfig;
use crate::model::{ArtworkFormat, ArtworkImage, ArtworkInfo};

/// Image processing errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ArtworkError {
    /// Bytes are not a readable image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Recognisable container the decoder cannot handle
    #[error("Unsupported image format: {0}")]
    Unsupported(String),

    /// Could not produce output within the contract
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

fn to_artwork_format(format: ImageFormat) -> ArtworkFormat {
    match format {
        ImageFormat::Jpeg => ArtworkFormat::Jpeg,
        ImageFormat::Png => ArtworkFormat::Png,
        ImageFormat::Gif => ArtworkFormat::Gif,
        ImageFormat::Bmp => ArtworkFormat::Bmp,
        ImageFormat::Tiff => ArtworkFormat::Tiff,
        ImageFormat::WebP => ArtworkFormat::WebP,
        _ => ArtworkFormat::Unknown,
    }
}

fn decode(bytes: &[u8]) -> Result<(DynamicImage, ArtworkFormat), ArtworkError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ArtworkError::Unsupported(e.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ArtworkError::Decode(e.to_string()))?;
    Ok((img, to_artwork_format(format)))
}

fn info_of(img: &DynamicImage, format: ArtworkFormat, byte_size: usize) -> ArtworkInfo {
    let (width, height) = img.dimensions();
    ArtworkInfo {
        format,
        width,
        height,
        byte_size: byte_size as u64,
        has_alpha: img.color().has_alpha(),
    }
}

/// Measure an image. Fully decodes it, so corrupt data is caught here.
pub fn inspect(bytes: &[u8]) -> Result<ArtworkInfo, ArtworkError> {
    let (img, format) = decode(bytes)?;
    Ok(info_of(&img, format, bytes.len()))
}

/// Scale `(width, height)` to fit inside `(max_w, max_h)` keeping aspect.
///
/// Never upscales; each side stays at least 1.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    let w = ((f64::from(width) * scale).round() as u32).clamp(1, max_w);
    let h = ((f64::from(height) * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Produces contract-compliant artwork.
#[derive(Debug, Clone)]
pub struct ArtworkOptimizer {
    config: ArtworkConfig,
}

impl Default for ArtworkOptimizer {
    fn default() -> Self {
        Self::new(ArtworkConfig::default())
    }
}

impl ArtworkOptimizer {
    pub fn new(config: ArtworkConfig) -> Self {
        Self { config }
    }

    /// Whether an image already satisfies the artwork contract.
    pub fn meets_contract(&self, info: &ArtworkInfo) -> bool {
        info.format.is_accepted()
            && info.width <= self.config.max_width
            && info.height <= self.config.max_height
            && info.byte_size <= self.config.max_bytes
    }

    /// Optimize image bytes into a contract-compliant image.
    pub fn optimize(&self, bytes: &[u8]) -> Result<ArtworkImage, ArtworkError> {
        let (img, format) = decode(bytes)?;
        let original = info_of(&img, format, bytes.len());

        if self.meets_contract(&original) {
            tracing::debug!(
                "Artwork already compliant: {}x{} {:?} ({} bytes)",
                original.width,
                original.height,
                original.format,
                original.byte_size
            );
            return Ok(ArtworkImage::new(original, bytes.to_vec()));
        }

        let (w, h) = fit_within(
            original.width,
            original.height,
            self.config.max_width,
            self.config.max_height,
        );
        let mut current = if (w, h) == img.dimensions() {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };

        if self.config.preserve_alpha && original.has_alpha {
            let png = encode_png(&current)?;
            if png.len() as u64 <= self.config.max_bytes {
                let info = info_of(&current, ArtworkFormat::Png, png.len());
                log_result(&original, &info, None);
                return Ok(ArtworkImage::new(info, png));
            }
            tracing::debug!("PNG with alpha is {} bytes, falling back to JPEG", png.len());
        }

        loop {
            let rgb = flatten_onto_white(&current);
            if let Some((jpeg, quality)) = self.fit_quality(&rgb)? {
                let info = ArtworkInfo {
                    format: ArtworkFormat::Jpeg,
                    width: rgb.width(),
                    height: rgb.height(),
                    byte_size: jpeg.len() as u64,
                    has_alpha: false,
                };
                log_result(&original, &info, Some(quality));
                return Ok(ArtworkImage::new(info, jpeg));
            }

            let (cw, ch) = current.dimensions();
            let nw = ((cw as f32 * self.config.downscale_factor) as u32).max(1);
            let nh = ((ch as f32 * self.config.downscale_factor) as u32).max(1);
            if (nw, nh) == (cw, ch) {
                return Err(ArtworkError::Encode(format!(
                    "cannot fit {}x{} under {} bytes",
                    cw, ch, self.config.max_bytes
                )));
            }
            tracing::debug!(
                "Quality floor reached at {}x{}, downscaling to {}x{}",
                cw,
                ch,
                nw,
                nh
            );
            current = current.resize_exact(nw, nh, FilterType::Lanczos3);
        }
    }

    /// JPEG-encode at decreasing quality until the byte cap is met.
    /// Returns `None` when even `min_quality` is too large.
    fn fit_quality(&self, rgb: &RgbImage) -> Result<Option<(Vec<u8>, u8)>, ArtworkError> {
        let min = self.config.min_quality.max(1);
        let step = self.config.quality_step.max(1);
        let mut quality = self.config.initial_quality.clamp(min, 100);

        loop {
            let jpeg = encode_jpeg(rgb, quality)?;
            if jpeg.len() as u64 <= self.config.max_bytes {
                return Ok(Some((jpeg, quality)));
            }
            if quality == min {
                return Ok(None);
            }
            quality = quality.saturating_sub(step).max(min);
        }
    }
}

fn log_result(original: &ArtworkInfo, result: &ArtworkInfo, quality: Option<u8>) {
    tracing::info!(
        "Artwork optimized: {}x{} ({} bytes) -> {}x{} {:?} ({} bytes){}",
        original.width,
        original.height,
        original.byte_size,
        result.width,
        result.height,
        result.format,
        result.byte_size,
        quality.map(|q| format!(", quality {q}")).unwrap_or_default()
    );
}

/// Composite onto a white background and drop alpha.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ArtworkError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(rgb)
        .map_err(|e| ArtworkError::Encode(e.to_string()))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ArtworkError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| ArtworkError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Fitted dimensions stay in bounds and keep the aspect ratio
        #[test]
        fn fit_within_bounds_and_aspect(w in 1u32..10_000, h in 1u32..10_000) {
            let (fw, fh) = fit_within(w, h, 500, 500);
            prop_assert!(fw <= 500 && fh <= 500);
            prop_assert!(fw >= 1 && fh >= 1);

            if w > 500 || h > 500 {
                prop_assert_eq!(fw.max(fh), 500);
                // One pixel of rounding on the short side
                let expected = f64::from(w.min(h)) * 500.0 / f64::from(w.max(h));
                prop_assert!((f64::from(fw.min(fh)) - expected).abs() <= 1.0);
            } else {
                prop_assert_eq!((fw, fh), (w, h));
            }
        }
    }
}
