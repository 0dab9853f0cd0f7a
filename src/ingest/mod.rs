//! Inbound call-state events.
//!
//! Platform callbacks hand raw events to a [`CallContext`], which normalizes
//! them into signals and forwards those to the coordinator:
//!
//! ```text
//! call integration ─┐
//! UI observer ──────┼─▶ CallContext ─▶ SignalNormalizer ─▶ Coordinator
//! phone broadcasts ─┘
//! ```
//!
//! Traces of raw events can be recorded as JSONL and replayed.

pub mod context;
pub mod normalizer;
pub mod replay;

// Re-export key types
pub use context::CallContext;
pub use normalizer::{
    DialerMatcher, SignalNormalizer, UiEvidence, DEFAULT_DIALER_PACKAGES,
    DEFAULT_FALLBACK_SUBSTRINGS,
};
pub use replay::{normalize_trace, parse_trace, read_trace, replay, ReplayOutcome, TraceEvent};
