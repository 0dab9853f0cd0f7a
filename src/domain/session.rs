//! Call session state owned by the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recording::RecordingJob;

/// Lifecycle state of the call as the coordinator believes it to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call
    Idle,

    /// Authoritative source reports a call that is not yet connected
    Ringing,

    /// Call in progress
    Active,

    /// An ending signal arrived; waiting out the grace period
    Grace,
}

impl Default for CallState {
    fn default() -> Self {
        Self::Idle
    }
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Grace => "grace",
        }
    }
}

/// The single live call session.
///
/// Sessions are never `Idle`: reaching idle destroys the session.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub session_id: u64,
    pub state: CallState,
    pub started_at: DateTime<Utc>,

    /// Set once the recorder confirms a started job
    pub recording: Option<RecordingJob>,

    /// A start request is in flight
    pub start_pending: bool,

    /// Automatic start has already been requested for this session
    pub recording_attempted: bool,

    pub route_forced: bool,

    /// Speaker was forced (or manually released) once for this session
    pub speaker_requested: bool,

    /// Once set, heuristic signals for this session are advisory only
    pub last_authoritative_signal_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(session_id: u64, state: CallState, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            state,
            started_at,
            recording: None,
            start_pending: false,
            recording_attempted: false,
            route_forced: false,
            speaker_requested: false,
            last_authoritative_signal_at: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.as_ref().map(|j| j.is_active()).unwrap_or(false)
    }

    /// Whether a stop must be sent to the recorder when this session ends
    pub fn needs_stop(&self) -> bool {
        self.recording.is_some() || self.start_pending
    }

    pub fn has_authoritative_signal(&self) -> bool {
        self.last_authoritative_signal_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_no_recording() {
        let session = CallSession::new(1, CallState::Active, Utc::now());
        assert!(!session.is_recording());
        assert!(!session.needs_stop());
        assert!(!session.has_authoritative_signal());
    }

    #[test]
    fn test_pending_start_needs_stop() {
        let mut session = CallSession::new(1, CallState::Active, Utc::now());
        session.start_pending = true;
        assert!(session.needs_stop());
        assert!(!session.is_recording());
    }
}
