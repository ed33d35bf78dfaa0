//! Catalog search command.

use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::artwork::ArtworkOptimizer;
use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::model::TrackMetadata;
use crate::resolver::{ArtworkResolver, Resolution, best_candidate};

/// Search the catalog the way the pipeline would for a track
pub fn cmd_search(
    rt: &Runtime,
    config: &Config,
    artist: Option<&str>,
    album: Option<&str>,
    title: Option<&str>,
    filename: Option<&Path>,
) -> anyhow::Result<()> {
    let metadata = TrackMetadata::new(artist, album, title);
    let source = filename.unwrap_or_else(|| Path::new(""));

    let catalog = Arc::new(CatalogClient::new(&config.catalog)?);
    let resolver = ArtworkResolver::new(
        catalog,
        ArtworkOptimizer::new(config.artwork.clone()),
        config.resolver.clone(),
    );

    rt.block_on(async {
        match resolver.search(&metadata, source).await {
            Resolution::Candidates(candidates) => {
                let best = best_candidate(&candidates).map(|c| c.id.clone());
                println!("Found {} candidate(s):", candidates.len());
                println!();
                for (n, c) in candidates.iter().enumerate() {
                    let marker = if Some(&c.id) == best.as_ref() { "*" } else { " " };
                    println!(
                        "{}{:>2}. {} - {} ({})",
                        marker,
                        n + 1,
                        c.release_artist,
                        c.release_title,
                        c.release_date.as_deref().unwrap_or("date unknown")
                    );
                    println!(
                        "     front: {}  approved: {}",
                        if c.is_front_cover { "yes" } else { "no" },
                        if c.is_approved { "yes" } else { "no" }
                    );
                    println!("     {}", c.source_url);
                }
                println!();
                println!("* = picked by prefer-best-candidate");
            }
            Resolution::NoArtwork(warning) => {
                println!("No artwork: {}", warning.message);
            }
            Resolution::KeepEmbedded | Resolution::OptimizeEmbedded => {}
        }
    });

    Ok(())
}
