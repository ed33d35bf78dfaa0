//! Batch processing command.

use anyhow::Context;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::metadata::LoftyTags;
use crate::model::{Selection, TrackItem, TrackStatus};
use crate::pipeline::ProcessingPipeline;
use crate::resolver::SelectionStrategy;
use crate::tasks::{JobSnapshot, JobState, TaskManager};

use super::collect_audio_files;

/// Process track files into the output directory
pub fn cmd_process(
    rt: &Runtime,
    config: &Config,
    path: &Path,
    recursive: bool,
    strategy: Option<SelectionStrategy>,
    error_log: Option<&Path>,
) -> anyhow::Result<()> {
    let files = collect_audio_files(path, recursive)?;
    if files.is_empty() {
        println!("No audio files found in {}", path.display());
        return Ok(());
    }

    let catalog = Arc::new(CatalogClient::new(&config.catalog)?);
    let pipeline = ProcessingPipeline::from_config(config, Arc::new(LoftyTags), catalog);

    println!("Processing {} file(s)", files.len());
    println!("Output: {}", pipeline.output().root().display());
    let manager = TaskManager::new(pipeline, strategy);

    if let Some(strategy) = strategy {
        println!("Artwork selection: {}", strategy);
    }
    println!();

    manager.enqueue(files)?;
    // The worker lives on the runtime's threads; prompts run here
    rt.block_on(async { manager.start() })?;

    let snapshot = loop {
        let snapshot = rt.block_on(manager.wait_settled());
        if !snapshot.worker_active {
            break snapshot;
        }
        if snapshot.waiting_for_selection {
            prompt_selections(&manager, &snapshot)?;
        }
    };

    print_summary(&snapshot);

    if let Some(log_path) = error_log {
        let log = manager.export_error_log(snapshot.job_id)?;
        std::fs::write(log_path, log)
            .with_context(|| format!("Failed to write error log to: {:?}", log_path))?;
        println!("Error log written to {}", log_path.display());
    }

    if snapshot.count(TrackStatus::Failed) > 0 {
        println!("Re-run after fixing the files above to retry the failures.");
    }
    Ok(())
}

/// Ask the operator about every parked track.
fn prompt_selections(manager: &TaskManager, snapshot: &JobSnapshot) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let parked: Vec<&TrackItem> = snapshot
        .items
        .iter()
        .filter(|i| i.status == TrackStatus::AwaitingSelection && i.selection.is_none())
        .collect();

    for item in parked {
        println!("{}", item.file_name());
        if let Some(ref art) = item.current_artwork {
            println!(
                "  e) keep embedded artwork ({}x{}, {} KB)",
                art.info.width,
                art.info.height,
                art.info.byte_size / 1024
            );
        }
        for (n, c) in item.candidates.iter().enumerate() {
            let size = match (c.width, c.height) {
                (Some(w), Some(h)) => format!("{w}x{h}"),
                _ => "size unknown".to_string(),
            };
            println!(
                "  {}) {} - {} ({}){}{}",
                n + 1,
                c.release_artist,
                c.release_title,
                size,
                if c.is_front_cover { " [front]" } else { "" },
                c.release_date
                    .as_ref()
                    .map(|d| format!(" {d}"))
                    .unwrap_or_default()
            );
        }
        println!("  s) skip, a) best candidate for all remaining");

        let selection = loop {
            print!("> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF: nobody is answering
                break Selection::Skip;
            }
            match parse_answer(line.trim(), item) {
                Some(Answer::Select(selection)) => break selection,
                Some(Answer::All) => {
                    let n = manager.apply_strategy(SelectionStrategy::PreferBestCandidate);
                    println!("Applied best candidate to {} track(s)", n);
                    return Ok(());
                }
                None => println!("Please answer with a number, e, s or a"),
            }
        };

        manager.select_candidate(item.id, selection)?;
        println!();
    }
    Ok(())
}

enum Answer {
    Select(Selection),
    All,
}

fn parse_answer(input: &str, item: &TrackItem) -> Option<Answer> {
    match input {
        "s" | "skip" => Some(Answer::Select(Selection::Skip)),
        "a" | "all" => Some(Answer::All),
        "e" if item.current_artwork.is_some() => Some(Answer::Select(Selection::Embedded)),
        _ => {
            let n: usize = input.parse().ok()?;
            let candidate = item.candidates.get(n.checked_sub(1)?)?;
            Some(Answer::Select(Selection::Candidate(candidate.id.clone())))
        }
    }
}

fn print_summary(snapshot: &JobSnapshot) {
    println!();
    match snapshot.state {
        JobState::Cancelled => println!("Job cancelled after {:.1?}", snapshot.elapsed),
        _ => println!("Finished in {:.1?}", snapshot.elapsed),
    }
    println!("  ✓ Completed: {}", snapshot.count(TrackStatus::Completed));
    println!("  ✗ Failed:    {}", snapshot.count(TrackStatus::Failed));
    if snapshot.count(TrackStatus::Cancelled) > 0 {
        println!("  - Cancelled: {}", snapshot.count(TrackStatus::Cancelled));
    }

    for item in &snapshot.items {
        match item.status {
            TrackStatus::Completed => {
                if let Some(ref out) = item.output_path {
                    println!("  {} -> {}", item.file_name(), out.display());
                }
                for warning in &item.warnings {
                    println!("      ! {}", warning.user_message);
                }
            }
            TrackStatus::Failed => {
                let reason = item
                    .terminal_error
                    .as_ref()
                    .map(|e| e.user_message.as_str())
                    .unwrap_or("unknown error");
                println!("  {} failed: {}", item.file_name(), reason);
            }
            _ => {}
        }
    }
}
