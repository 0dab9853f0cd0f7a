//! callrec - Call lifecycle detection and recording coordinator
//!
//! Decides when a voice call is in progress and drives a recorder and the
//! audio route for its duration.
//!
//! # Architecture
//!
//! Call state arrives from two unreliable sources: the platform call
//! integration (authoritative, but bypassed by many OEM dialers) and UI
//! observation of dialer apps (heuristic). Both are normalized into signals
//! and fed to a single coordinator task:
//!
//! - Ending signals open a grace period instead of stopping immediately
//! - Recording runs on its own worker and negotiates a capture source
//! - The speaker route is forced once per call and always restored
//! - Every transition is appended to a session journal
//!
//! # Modules
//!
//! - `adapters`: Platform seams (capture backend, audio router) and simulations
//! - `core`: Coordinator, recording engine, route controller, journal
//! - `domain`: Data structures (RawEvent, Signal, CallSession, RecordingJob)
//! - `ingest`: Signal normalization and trace replay
//! - `library`: Recordings listing
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Replay a captured event trace
//! callrec replay trace.jsonl
//!
//! # See how a trace normalizes
//! callrec normalize trace.jsonl
//!
//! # Browse results
//! callrec recordings
//! callrec sessions
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod library;

// Re-export main types at crate root for convenience
pub use core::{Coordinator, CoordinatorHandle, CoordinatorStatus, LifecycleSettings};
pub use domain::{CallState, RawEvent, RecordingJob, Signal, SignalKind, SignalSource};
pub use ingest::{CallContext, SignalNormalizer};
