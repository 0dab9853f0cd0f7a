//! Domain types for the call recorder.
//!
//! This module contains the core data structures:
//! - RawEvent: Inbound platform events
//! - Signal: Normalized call-state evidence
//! - CallSession: The coordinator's view of the live call
//! - RecordingJob: A recording owned by the engine
//! - JournalEntry / SessionSummary: Persisted lifecycle history

pub mod events;
pub mod raw;
pub mod recording;
pub mod session;
pub mod signal;
pub mod summary;

// Re-export commonly used types
pub use events::{JournalEntry, JournalEventType};
pub use raw::{PhoneState, RawEvent, TelecomCallState};
pub use recording::{
    CaptureSource, Container, ControlAction, EncoderSettings, JobStatus, RecordingControl,
    RecordingJob,
};
pub use session::{CallSession, CallState};
pub use signal::{Signal, SignalCause, SignalKind, SignalSource};
pub use summary::SessionSummary;
