//! Core call-recording logic.
//!
//! This module contains:
//! - Coordinator: The call lifecycle state machine
//! - DebounceTimer: Grace-period timer
//! - RecordingEngine: Capture negotiation and output lifecycle
//! - AudioRouteController: Speaker forcing with restore
//! - SessionJournal: Append-only lifecycle log

pub mod coordinator;
pub mod debounce;
pub mod journal;
pub mod recorder;
pub mod route;

// Re-export commonly used types
pub use coordinator::{
    ControlError, Coordinator, CoordinatorHandle, CoordinatorStatus, LifecycleSettings,
    DEFAULT_GRACE_PERIOD,
};
pub use debounce::DebounceTimer;
pub use journal::{JournalSender, JournalWriter, SessionJournal};
pub use recorder::{
    Capabilities, FinalizeWarning, RecorderError, RecorderGone, RecorderHandle, RecorderReply,
    RecorderSettings, RecorderStatus, RecorderWorker, RecordingEngine, RejectedSource,
    StopOutcome,
};
pub use route::{AudioRouteController, RouteSnapshot, RouteState};
