//! Append-only session journal with file-based persistence.
//!
//! Entries are stored as newline-delimited JSON (JSONL) in a single file,
//! appended under an exclusive file lock so several processes can share it.
//! The coordinator never writes directly: entries go through a
//! [`JournalWriter`] task so disk latency stays off the serialization point.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{JournalEntry, SessionSummary};

/// File-based session journal using JSONL format
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal at the configured location (`<home>/journal.jsonl`)
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::config::journal_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry to the log
    pub async fn append(&self, entry: &JournalEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &json))
            .await
            .context("Journal append task failed")?
    }

    /// Replay all entries in order.
    ///
    /// A torn final line (crash mid-append) is skipped with a warning.
    pub async fn replay(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut entries = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Skipping unreadable journal line"),
            }
        }

        Ok(entries)
    }

    /// Per-session summaries, oldest first
    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let entries = self.replay().await?;
        Ok(SessionSummary::group(&entries))
    }

    /// Entries belonging to one session of one coordinator run
    pub async fn session_entries(&self, run_id: Uuid, session_id: u64) -> Result<Vec<JournalEntry>> {
        let entries = self.replay().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.run_id == run_id && e.session_id == session_id)
            .collect())
    }
}

fn append_line(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create journal directory: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open journal: {}", path.display()))?;

    file.lock_exclusive()
        .context("Failed to acquire file lock on journal")?;

    writeln!(file, "{}", json).context("Failed to write journal entry")?;
    file.flush().context("Failed to flush journal entry")?;

    // Lock is released when file is dropped
    Ok(())
}

/// Cheap, cloneable sending side of a [`JournalWriter`]
#[derive(Debug, Clone)]
pub struct JournalSender {
    tx: Option<mpsc::UnboundedSender<JournalEntry>>,
}

impl JournalSender {
    /// A sender that drops every entry
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an entry; never blocks
    pub fn record(&self, entry: JournalEntry) {
        let Some(ref tx) = self.tx else {
            return;
        };
        if tx.send(entry).is_err() {
            warn!("Journal writer is gone; entry dropped");
        }
    }
}

/// Task that appends queued entries in order.
///
/// Exits once every [`JournalSender`] has been dropped and the queue is
/// drained.
pub struct JournalWriter;

impl JournalWriter {
    pub fn spawn(journal: SessionJournal) -> (JournalSender, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<JournalEntry>();

        let task = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(entry) = rx.recv().await {
                match journal.append(&entry).await {
                    Ok(()) => written += 1,
                    Err(e) => warn!(
                        session_id = entry.session_id,
                        error = %e,
                        "Failed to append journal entry"
                    ),
                }
            }
            debug!(written, path = %journal.path().display(), "Journal writer stopped");
        });

        (JournalSender { tx: Some(tx) }, task)
    }
}
