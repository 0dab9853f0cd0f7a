//! Journal event types for the session journal.
//!
//! Every lifecycle transition of a call session is recorded as an immutable
//! entry in an append-only log.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the append-only session journal.
///
/// The outcome of any session can be reconstructed by replaying its entries
/// in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// When this entry was recorded (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Coordinator run that wrote this entry. Session ids restart with every
    /// run, so a session is identified by `(run_id, session_id)`.
    #[serde(default)]
    pub run_id: Uuid,

    /// The call session this entry belongs to
    pub session_id: u64,

    /// Type of entry
    pub event_type: JournalEventType,

    /// Human-readable summary (no phone numbers)
    pub summary: String,

    /// Recording output file, when relevant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Error or warning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JournalEntry {
    /// Create a new entry with the current timestamp
    pub fn new(session_id: u64, event_type: JournalEventType, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: Uuid::nil(),
            session_id,
            event_type,
            summary: summary.into(),
            output_path: None,
            error: None,
        }
    }

    /// Tag the entry with the run that wrote it
    pub fn in_run(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Attach the recording output path
    pub fn with_output(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of journal entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEventType {
    /// A new call session was created
    SessionStarted,

    /// The session moved between ringing/active/grace
    StateChanged,

    /// The recorder confirmed an active recording
    RecordingStarted,

    /// The recorder could not start
    RecordingFailed,

    /// The recording was finalized
    RecordingStopped,

    /// Audio output was forced to the speaker
    RouteForced,

    /// The previous audio route was restored
    RouteRestored,

    /// The session was destroyed (call over)
    SessionEnded,
}
