//! Signal normalizer.
//!
//! Reduces the three inbound event families to [`Signal`]s:
//!
//! - platform call-integration events (authoritative)
//! - legacy telephony broadcasts (authoritative)
//! - UI observations of dialer apps (heuristic)
//!
//! UI observations are only trusted from known dialer packages. A UI event
//! from any other package while the call screen was showing means the user
//! switched away from it, which is weak evidence that the call ended.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, trace};

use crate::domain::{
    PhoneState, RawEvent, Signal, SignalCause, SignalKind, TelecomCallState,
};

/// Dialer packages whose UI is trusted by default
pub const DEFAULT_DIALER_PACKAGES: &[&str] = &[
    "com.google.android.dialer",
    "com.android.dialer",
    "com.samsung.android.dialer",
    "com.miui.voip",
    "com.coloros.phone",
    "com.oneplus.dialer",
    "com.huawei.contacts",
];

/// Package-name fragments that mark an unknown package as a dialer
pub const DEFAULT_FALLBACK_SUBSTRINGS: &[&str] = &["dialer", "phone", "incall"];

/// Elapsed-call timer as shown by dialers: `m:ss`, `mm:ss` or `h:mm:ss`
static CALL_TIMER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$").expect("call timer pattern"));

const ACTIVE_PHRASES: &[&str] = &["calling", "on going", "ongoing", "ringing"];
const ENDING_PHRASES: &[&str] = &["end call", "call ended", "ended"];

/// Decides which packages count as a dialer
#[derive(Debug, Clone)]
pub struct DialerMatcher {
    packages: HashSet<String>,
    fallback: Vec<String>,
}

impl Default for DialerMatcher {
    fn default() -> Self {
        Self {
            packages: DEFAULT_DIALER_PACKAGES.iter().map(|p| p.to_string()).collect(),
            fallback: DEFAULT_FALLBACK_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DialerMatcher {
    /// Default allow-list plus `extra_packages`.
    ///
    /// An empty `fallback` keeps the default substrings.
    pub fn new(extra_packages: &[String], fallback: &[String]) -> Self {
        let mut matcher = Self::default();
        matcher.packages.extend(extra_packages.iter().cloned());
        if !fallback.is_empty() {
            matcher.fallback = fallback.iter().map(|s| s.to_lowercase()).collect();
        }
        matcher
    }

    pub fn is_dialer(&self, package: &str) -> bool {
        if self.packages.contains(package) {
            return true;
        }
        let lower = package.to_lowercase();
        self.fallback.iter().any(|s| lower.contains(s.as_str()))
    }
}

/// What a single UI observation says about the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiEvidence {
    pub active: bool,
    pub ending: bool,
}

impl UiEvidence {
    /// Inspect a dialer window's class name and visible text
    pub fn inspect(class_name: &str, text: &[String]) -> Self {
        let mut evidence = Self::default();

        let class = class_name.to_lowercase();
        if class.contains("incall") || class.contains("call") {
            evidence.active = true;
        }

        for token in text {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let lower = token.to_lowercase();

            if CALL_TIMER.is_match(token) || ACTIVE_PHRASES.iter().any(|p| lower.contains(p)) {
                evidence.active = true;
            }
            if ENDING_PHRASES.iter().any(|p| lower.contains(p)) {
                evidence.ending = true;
            }
        }

        evidence
    }
}

/// Stateful converter from [`RawEvent`] to [`Signal`]s
#[derive(Debug, Clone, Default)]
pub struct SignalNormalizer {
    dialers: DialerMatcher,

    /// A dialer's call screen has been seen since the last switch-away
    call_ui_visible: bool,
}

impl SignalNormalizer {
    pub fn new(dialers: DialerMatcher) -> Self {
        Self {
            dialers,
            call_ui_visible: false,
        }
    }

    /// Normalize one event observed at `at`.
    ///
    /// Returns zero, one or two signals. Two only when a UI observation
    /// carries both active and ending evidence; active comes first.
    pub fn normalize(&mut self, event: &RawEvent, at: DateTime<Utc>) -> Vec<Signal> {
        let signals = match event {
            RawEvent::CallAdded { .. } => {
                vec![Signal::authoritative(SignalKind::Active, SignalCause::CallAdded, at)]
            }
            RawEvent::CallStateChanged { state, .. } => {
                let kind = match state {
                    TelecomCallState::Ringing => SignalKind::Indeterminate,
                    TelecomCallState::Active => SignalKind::Active,
                    TelecomCallState::Disconnected => SignalKind::Ending,
                };
                vec![Signal::authoritative(kind, SignalCause::CallState, at)]
            }
            RawEvent::CallRemoved { .. } => {
                vec![Signal::authoritative(SignalKind::Ending, SignalCause::CallRemoved, at)]
            }
            RawEvent::LegacyPhoneState { state, .. } => match state {
                PhoneState::Offhook => vec![Signal::authoritative(
                    SignalKind::Active,
                    SignalCause::LegacyBroadcast,
                    at,
                )],
                PhoneState::Idle => vec![Signal::authoritative(
                    SignalKind::Ending,
                    SignalCause::LegacyBroadcast,
                    at,
                )],
                // Ringing says nothing the call integration does not
                PhoneState::Ringing => Vec::new(),
            },
            RawEvent::UiObservation {
                package_name,
                class_name,
                text,
            } => self.normalize_ui(package_name, class_name, text, at),
        };

        trace!(event = event.label(), signals = signals.len(), "Normalized event");
        signals
    }

    fn normalize_ui(
        &mut self,
        package: &str,
        class_name: &str,
        text: &[String],
        at: DateTime<Utc>,
    ) -> Vec<Signal> {
        if !self.dialers.is_dialer(package) {
            if !self.call_ui_visible {
                return Vec::new();
            }
            debug!(package, "Switched away from call screen");
            self.call_ui_visible = false;
            return vec![Signal::heuristic(
                SignalKind::Ending,
                SignalCause::UiLeftDialer,
                package,
                at,
            )];
        }

        let evidence = UiEvidence::inspect(class_name, text);
        let mut signals = Vec::with_capacity(2);

        if evidence.active {
            self.call_ui_visible = true;
            signals.push(Signal::heuristic(
                SignalKind::Active,
                SignalCause::UiEvidence,
                package,
                at,
            ));
        }
        if evidence.ending {
            signals.push(Signal::heuristic(
                SignalKind::Ending,
                SignalCause::UiEvidence,
                package,
                at,
            ));
        }

        signals
    }

    /// Whether a dialer call screen is believed to be showing
    pub fn call_ui_visible(&self) -> bool {
        self.call_ui_visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalSource;

    fn ui(package: &str, class_name: &str, text: &[&str]) -> RawEvent {
        RawEvent::UiObservation {
            package_name: package.to_string(),
            class_name: class_name.to_string(),
            text: text.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_call_timer_pattern() {
        assert!(CALL_TIMER.is_match("0:05"));
        assert!(CALL_TIMER.is_match("12:34"));
        assert!(CALL_TIMER.is_match("1:02:03"));
        assert!(!CALL_TIMER.is_match("123:45"));
        assert!(!CALL_TIMER.is_match("12:3"));
        assert!(!CALL_TIMER.is_match("at 12:34"));
    }

    #[test]
    fn test_dialer_matcher() {
        let matcher = DialerMatcher::default();
        assert!(matcher.is_dialer("com.google.android.dialer"));
        assert!(matcher.is_dialer("com.vendor.InCallUI"));
        assert!(matcher.is_dialer("org.fossify.phone"));
        assert!(!matcher.is_dialer("com.whatsapp"));

        let extended = DialerMatcher::new(&["com.whatsapp".to_string()], &[]);
        assert!(extended.is_dialer("com.whatsapp"));
        assert!(extended.is_dialer("org.fossify.phone"));
    }

    #[test]
    fn test_ui_evidence_both_directions() {
        let evidence = UiEvidence::inspect("", &["01:15".to_string(), "Call ended".to_string()]);
        assert!(evidence.active);
        assert!(evidence.ending);

        let evidence = UiEvidence::inspect("android.widget.FrameLayout", &["Contacts".to_string()]);
        assert_eq!(evidence, UiEvidence::default());
    }

    #[test]
    fn test_active_emitted_before_ending() {
        let mut normalizer = SignalNormalizer::default();
        let signals = normalizer.normalize(
            &ui("com.android.dialer", "", &["0:42", "End call"]),
            Utc::now(),
        );

        let kinds: Vec<SignalKind> = signals.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SignalKind::Active, SignalKind::Ending]);
        assert!(signals.iter().all(|s| s.source == SignalSource::Heuristic));
        assert_eq!(signals[0].origin_package, "com.android.dialer");
    }

    #[test]
    fn test_legacy_ringing_dropped() {
        let mut normalizer = SignalNormalizer::default();
        let event = RawEvent::LegacyPhoneState {
            state: PhoneState::Ringing,
            number: Some("+15550100".to_string()),
        };
        assert!(normalizer.normalize(&event, Utc::now()).is_empty());
    }

    #[test]
    fn test_switch_away_fires_once() {
        let mut normalizer = SignalNormalizer::default();
        let now = Utc::now();

        normalizer.normalize(&ui("com.android.dialer", "InCallActivity", &[]), now);
        assert!(normalizer.call_ui_visible());

        let away = normalizer.normalize(&ui("com.android.launcher", "", &[]), now);
        assert_eq!(away.len(), 1);
        assert_eq!(away[0].cause, SignalCause::UiLeftDialer);

        let again = normalizer.normalize(&ui("com.android.launcher", "", &[]), now);
        assert!(again.is_empty());
    }
}
