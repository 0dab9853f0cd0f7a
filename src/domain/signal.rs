//! Normalized call-state signals.
//!
//! Every inbound event family is reduced to a [`Signal`] before it reaches
//! the coordinator. Signals are values: produced once, consumed once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a signal claims about the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// A call is in progress (or being dialed)
    Active,

    /// The call may be ending
    Ending,

    /// A call exists but is not yet connected (ringing)
    Indeterminate,
}

/// Where a signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Platform call integration or telephony broadcast
    Authoritative,

    /// Inferred from UI observation of a third-party dialer
    Heuristic,
}

/// The raw event that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCause {
    CallAdded,
    CallState,
    CallRemoved,
    LegacyBroadcast,
    UiEvidence,
    UiLeftDialer,
}

/// A normalized call-state signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub source: SignalSource,
    pub cause: SignalCause,

    /// Package that produced a heuristic signal (empty for authoritative ones)
    pub origin_package: String,

    pub at: DateTime<Utc>,
}

impl Signal {
    /// Signal from the platform call integration
    pub fn authoritative(kind: SignalKind, cause: SignalCause, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            source: SignalSource::Authoritative,
            cause,
            origin_package: String::new(),
            at,
        }
    }

    /// Signal inferred from a UI event in `package`
    pub fn heuristic(
        kind: SignalKind,
        cause: SignalCause,
        package: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            source: SignalSource::Heuristic,
            cause,
            origin_package: package.into(),
            at,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.source == SignalSource::Authoritative
    }

    /// Authoritative removal of the call: skips the grace period
    pub fn is_removal(&self) -> bool {
        self.is_authoritative() && self.cause == SignalCause::CallRemoved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_requires_authoritative_source() {
        let now = Utc::now();
        let removed = Signal::authoritative(SignalKind::Ending, SignalCause::CallRemoved, now);
        assert!(removed.is_removal());

        let disconnected = Signal::authoritative(SignalKind::Ending, SignalCause::CallState, now);
        assert!(!disconnected.is_removal());

        let ui = Signal::heuristic(SignalKind::Ending, SignalCause::UiLeftDialer, "com.example", now);
        assert!(!ui.is_removal());
        assert_eq!(ui.origin_package, "com.example");
    }
}
