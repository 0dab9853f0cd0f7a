//! Session outcome reconstructed from journal entries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{JournalEntry, JournalEventType};

/// Outcome of one call session as recorded in the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub run_id: Uuid,
    pub session_id: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Output file of the (last) recording
    pub recording: Option<PathBuf>,

    /// Whether a recording was finalized
    pub recorded: bool,

    pub route_forced: bool,
    pub route_restored: bool,

    /// Errors and warnings, in order
    pub problems: Vec<String>,
}

impl SessionSummary {
    /// Reconstruct a session from its entries (in journal order).
    ///
    /// The first entry decides which run and session are summarized; entries
    /// of any other session are ignored.
    pub fn from_entries(entries: &[JournalEntry]) -> Option<Self> {
        let first = entries.first()?;
        let key = (first.run_id, first.session_id);

        let mut summary = Self {
            run_id: first.run_id,
            session_id: first.session_id,
            started_at: first.timestamp,
            ended_at: None,
            recording: None,
            recorded: false,
            route_forced: false,
            route_restored: false,
            problems: Vec::new(),
        };

        for entry in entries.iter().filter(|e| (e.run_id, e.session_id) == key) {
            summary.apply(entry);
        }

        Some(summary)
    }

    /// Group a whole journal into per-session summaries, oldest first
    pub fn group(entries: &[JournalEntry]) -> Vec<Self> {
        let mut keys: Vec<(Uuid, u64)> = Vec::new();
        for entry in entries {
            let key = (entry.run_id, entry.session_id);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        keys.into_iter()
            .filter_map(|key| {
                let session: Vec<JournalEntry> = entries
                    .iter()
                    .filter(|e| (e.run_id, e.session_id) == key)
                    .cloned()
                    .collect();
                Self::from_entries(&session)
            })
            .collect()
    }

    fn apply(&mut self, entry: &JournalEntry) {
        match entry.event_type {
            JournalEventType::SessionStarted => {
                self.started_at = entry.timestamp;
            }
            JournalEventType::StateChanged => {}
            JournalEventType::RecordingStarted => {
                self.recording = entry.output_path.clone();
            }
            JournalEventType::RecordingStopped => {
                self.recorded = true;
                if entry.output_path.is_some() {
                    self.recording = entry.output_path.clone();
                }
            }
            JournalEventType::RouteForced => self.route_forced = true,
            JournalEventType::RouteRestored => self.route_restored = true,
            JournalEventType::SessionEnded => {
                self.ended_at = Some(entry.timestamp);
            }
            JournalEventType::RecordingFailed => {}
        }

        if let Some(ref error) = entry.error {
            self.problems.push(error.clone());
        }
    }

    /// Whether the session has ended
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_entries() {
        let path = PathBuf::from("/rec/call_20260101_101010.m4a");
        let entries = vec![
            JournalEntry::new(4, JournalEventType::SessionStarted, "Session started"),
            JournalEntry::new(4, JournalEventType::RouteForced, "Speaker forced"),
            JournalEntry::new(4, JournalEventType::RecordingStarted, "Recording")
                .with_output(path.clone()),
            JournalEntry::new(4, JournalEventType::RecordingStopped, "Stopped")
                .with_output(path.clone())
                .with_error("recording output is empty"),
            JournalEntry::new(4, JournalEventType::RouteRestored, "Route restored"),
            JournalEntry::new(4, JournalEventType::SessionEnded, "Session ended"),
        ];

        let summary = SessionSummary::from_entries(&entries).unwrap();
        assert_eq!(summary.session_id, 4);
        assert!(summary.recorded);
        assert_eq!(summary.recording, Some(path));
        assert!(summary.route_forced && summary.route_restored);
        assert!(summary.is_finished());
        assert_eq!(summary.problems, vec!["recording output is empty".to_string()]);
    }

    #[test]
    fn test_group_keeps_session_order() {
        let entries = vec![
            JournalEntry::new(1, JournalEventType::SessionStarted, "s1"),
            JournalEntry::new(2, JournalEventType::SessionStarted, "s2"),
            JournalEntry::new(1, JournalEventType::SessionEnded, "e1"),
        ];

        let sessions = SessionSummary::group(&entries);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, 1);
        assert!(sessions[0].is_finished());
        assert!(!sessions[1].is_finished());
    }

    #[test]
    fn test_group_separates_runs() {
        let (first_run, second_run) = (Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![
            JournalEntry::new(1, JournalEventType::SessionStarted, "s1").in_run(first_run),
            JournalEntry::new(1, JournalEventType::SessionEnded, "e1").in_run(first_run),
            JournalEntry::new(1, JournalEventType::SessionStarted, "s1").in_run(second_run),
            JournalEntry::new(1, JournalEventType::RecordingFailed, "failed")
                .in_run(second_run)
                .with_error("missing permissions: RECORD_AUDIO"),
        ];

        let sessions = SessionSummary::group(&entries);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].run_id, first_run);
        assert!(sessions[0].is_finished());
        assert!(sessions[0].problems.is_empty());
        assert_eq!(sessions[1].run_id, second_run);
        assert!(!sessions[1].is_finished());
        assert_eq!(sessions[1].problems.len(), 1);
    }

    #[test]
    fn test_empty_entries() {
        assert!(SessionSummary::from_entries(&[]).is_none());
    }
}
