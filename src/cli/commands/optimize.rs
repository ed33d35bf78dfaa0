//! Single-image optimization command.

use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::artwork::{self, ArtworkOptimizer};
use crate::config::Config;
use crate::model::{ArtworkFormat, ArtworkInfo};

/// Fit one image file to the artwork contract
pub fn cmd_optimize(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read image: {:?}", input))?;
    let optimizer = ArtworkOptimizer::new(config.artwork.clone());

    let before = artwork::inspect(&bytes)?;
    print_info("Input ", &before, optimizer.meets_contract(&before));

    let image = optimizer.optimize(&bytes)?;
    let output = with_format_extension(output, image.info.format);
    std::fs::write(&output, image.bytes())
        .with_context(|| format!("Failed to write image to: {:?}", output))?;

    print_info("Output", &image.info, optimizer.meets_contract(&image.info));
    println!("Written to {}", output.display());
    Ok(())
}

fn print_info(label: &str, info: &ArtworkInfo, compliant: bool) {
    println!(
        "{}: {:?} {}x{}, {} KB{}{}",
        label,
        info.format,
        info.width,
        info.height,
        info.byte_size / 1024,
        if info.has_alpha { ", alpha" } else { "" },
        if compliant { " ✓" } else { " (outside contract)" }
    );
}

/// Make the extension match the encoded format.
fn with_format_extension(path: &Path, format: ArtworkFormat) -> PathBuf {
    let ext = match format {
        ArtworkFormat::Png => "png",
        _ => "jpg",
    };
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| e == ext || (ext == "jpg" && e == "jpeg"));
    if matches {
        path.to_path_buf()
    } else {
        path.with_extension(ext)
    }
}
