//! Raw inbound events, as delivered by the host platform.
//!
//! These are serializable so that captured traces can be replayed
//! (`callrec replay`) and so the payloads can cross a process boundary.

use serde::{Deserialize, Serialize};

/// Call state reported by the platform call integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelecomCallState {
    Ringing,
    Active,
    Disconnected,
}

/// Legacy telephony broadcast state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneState {
    Ringing,
    Offhook,
    Idle,
}

/// An event from one of the three inbound families
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    CallAdded {
        call_id: String,
    },

    CallStateChanged {
        call_id: String,
        state: TelecomCallState,
    },

    CallRemoved {
        call_id: String,
    },

    /// Accessibility-style observation of some app's UI
    UiObservation {
        package_name: String,
        #[serde(default)]
        class_name: String,
        #[serde(default)]
        text: Vec<String>,
    },

    LegacyPhoneState {
        state: PhoneState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        number: Option<String>,
    },
}

impl RawEvent {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::CallAdded { .. } => "call_added",
            Self::CallStateChanged { .. } => "call_state_changed",
            Self::CallRemoved { .. } => "call_removed",
            Self::UiObservation { .. } => "ui_observation",
            Self::LegacyPhoneState { .. } => "legacy_phone_state",
        }
    }
}
