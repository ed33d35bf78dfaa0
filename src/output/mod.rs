//! Output destination for processed tracks.
//!
//! Output names come from a pattern (default `{Artist} - {Title}.{ext}`).
//! Pattern variables: {Artist}, {Album}, {Title}, {Stem}, {ext}
//!
//! Files are staged under a `.part` name and renamed into place, so an
//! output file is either complete or absent.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::model::TrackMetadata;

/// Output destination failures. All of them are system errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutputError {
    /// The destination directory cannot be created or written to
    #[error("Output directory {0} is not writable: {1}")]
    NotWritable(PathBuf, String),

    /// A single output file could not be written
    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, String),
}

const PROBE_NAME: &str = ".artwork-minder-probe";

/// Directory that receives processed copies.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
    pattern: String,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.directory, &config.pattern)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed and check that files can be written.
    pub fn ensure_ready(&self) -> Result<(), OutputError> {
        let not_writable = |e: std::io::Error| OutputError::NotWritable(self.root.clone(), e.to_string());

        fs::create_dir_all(&self.root).map_err(not_writable)?;
        let probe = self.root.join(PROBE_NAME);
        fs::write(&probe, b"").map_err(not_writable)?;
        fs::remove_file(&probe).map_err(not_writable)?;
        Ok(())
    }

    /// Output file name for a track, before uniqueness is applied.
    pub fn file_name(&self, metadata: &TrackMetadata, source: &Path) -> String {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "track".to_string());

        let (Some(artist), Some(title)) = (&metadata.artist, &metadata.title) else {
            return format!("{}_with_artwork.{}", sanitize_filename(&stem), ext);
        };

        let album = metadata.album.as_deref().unwrap_or("Unknown Album");
        render_pattern(&self.pattern, |key| match key {
            "Artist" => Some(sanitize_filename(artist)),
            "Album" => Some(sanitize_filename(album)),
            "Title" => Some(sanitize_filename(title)),
            "Stem" => Some(sanitize_filename(&stem)),
            "ext" => Some(ext.to_string()),
            _ => None,
        })
    }

    /// Pick a destination that does not exist yet, adding ` (n)` before
    /// the extension when the plain name is taken.
    pub fn unique_path(&self, metadata: &TrackMetadata, source: &Path) -> PathBuf {
        let base = self.root.join(self.file_name(metadata, source));
        if !is_taken(&base) {
            return base;
        }

        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = base.extension().map(|e| e.to_string_lossy().to_string());

        (1u32..)
            .map(|n| {
                let name = match ext {
                    Some(ref ext) => format!("{stem} ({n}).{ext}"),
                    None => format!("{stem} ({n})"),
                };
                base.with_file_name(name)
            })
            .find(|p| !is_taken(p))
            .unwrap_or(base)
    }

    /// Write an output file through a `.part` staging file.
    ///
    /// `write` receives the staging path. On any error the staging file is
    /// removed and nothing appears at `dest`.
    pub fn commit<E>(
        &self,
        dest: &Path,
        write: impl FnOnce(&Path) -> Result<(), E>,
    ) -> Result<(), CommitError<E>> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CommitError::Output(OutputError::NotWritable(parent.to_path_buf(), e.to_string())))?;
        }

        let part = part_path(dest);
        if let Err(e) = write(&part) {
            let _ = fs::remove_file(&part);
            return Err(CommitError::Write(e));
        }

        if let Err(e) = fs::rename(&part, dest) {
            let _ = fs::remove_file(&part);
            return Err(CommitError::Output(OutputError::Write(dest.to_path_buf(), e.to_string())));
        }

        tracing::debug!("Wrote {}", dest.display());
        Ok(())
    }
}

/// Failure of [`OutputDir::commit`]: either the caller's writer or the
/// output directory itself.
#[derive(Debug)]
pub enum CommitError<E> {
    Write(E),
    Output(OutputError),
}

/// Staging path next to `dest`: `.Name.ext.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.part"))
}

fn is_taken(path: &Path) -> bool {
    path.exists() || part_path(path).exists()
}

/// Substitute `{Name}` placeholders in one left-to-right pass.
///
/// Substituted values are never rescanned. Unknown placeholders and an
/// unmatched `{` are kept literally.
fn render_pattern(pattern: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            rest = tail;
            break;
        };
        match lookup(&tail[1..close]) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Sanitizes a filename by removing/replacing invalid characters
///
/// `.` and `..` become `_` so a tag can never name a parent directory.
fn sanitize_filename(name: &str) -> String {
    if matches!(name, "." | "..") {
        return "_".to_string();
    }
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}
