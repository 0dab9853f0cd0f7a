//! Listing of finished recordings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::config::paths::recordings_glob;

/// A recording file on disk
#[derive(Debug, Clone, Serialize)]
pub struct RecordingFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Local>,
}

impl RecordingFile {
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }
}

/// Recordings in `dir`, newest first.
///
/// A missing directory is an empty listing.
pub fn list_recordings(dir: &Path) -> Result<Vec<RecordingFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = recordings_glob(dir);
    let mut recordings = Vec::new();

    for entry in glob::glob(&pattern).context("Invalid recordings pattern")? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Skipping unreadable recording: {}", e);
                continue;
            }
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat recording: {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata
            .modified()
            .with_context(|| format!("No modification time for {}", path.display()))?;

        recordings.push(RecordingFile {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes: metadata.len(),
            modified: DateTime::<Local>::from(modified),
            path,
        });
    }

    recordings.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(recordings)
}
