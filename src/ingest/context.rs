//! Entry point for platform callbacks.
//!
//! Platform services (call integration, UI observer, broadcast receiver)
//! each hold a clone of [`CallContext`] instead of reaching for a global
//! coordinator instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{ControlError, CoordinatorHandle};
use crate::domain::{RawEvent, Signal};

use super::normalizer::SignalNormalizer;

#[derive(Clone)]
pub struct CallContext {
    normalizer: Arc<Mutex<SignalNormalizer>>,
    coordinator: CoordinatorHandle,
}

impl CallContext {
    pub fn new(normalizer: SignalNormalizer, coordinator: CoordinatorHandle) -> Self {
        Self {
            normalizer: Arc::new(Mutex::new(normalizer)),
            coordinator,
        }
    }

    /// The coordinator, for status queries and manual controls
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Normalize and forward an event observed now
    pub async fn dispatch(&self, event: RawEvent) -> Result<usize, ControlError> {
        self.dispatch_at(event, Utc::now()).await
    }

    /// Normalize and forward an event observed at `at`.
    ///
    /// The normalizer stays locked until every signal is queued, so
    /// concurrent callers reach the coordinator in normalization order and
    /// the signals of one event are never interleaved with another's.
    ///
    /// Returns how many signals reached the coordinator.
    pub async fn dispatch_at(&self, event: RawEvent, at: DateTime<Utc>) -> Result<usize, ControlError> {
        let mut normalizer = self.normalizer.lock().await;
        let signals: Vec<Signal> = normalizer.normalize(&event, at);

        if signals.is_empty() {
            debug!(event = event.label(), "Event produced no signal");
        }

        let count = signals.len();
        for signal in signals {
            self.coordinator.signal(signal).await?;
        }
        drop(normalizer);

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::adapters::{RouteMode, SimulatedBackend, SimulatedRouter};
    use crate::core::{
        AudioRouteController, Capabilities, Coordinator, JournalSender, LifecycleSettings,
        RecorderSettings, RecordingEngine,
    };
    use crate::domain::{CallState, Container};
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> (CallContext, tokio::task::JoinHandle<()>) {
        let mut recorder = RecorderSettings::new(temp.path().join("recordings"));
        recorder.encoder.container = Container::Wav;
        let engine = RecordingEngine::new(
            Arc::new(SimulatedBackend::new()),
            recorder,
            Capabilities::default(),
        );
        let route = AudioRouteController::new(Box::new(SimulatedRouter::new(RouteMode::Earpiece)));
        let (handle, task) = Coordinator::spawn(
            LifecycleSettings::default(),
            engine,
            route,
            JournalSender::disabled(),
        );
        (CallContext::new(SignalNormalizer::default(), handle), task)
    }

    fn dialer(text: &str) -> RawEvent {
        RawEvent::UiObservation {
            package_name: "com.android.dialer".to_string(),
            class_name: String::new(),
            text: vec![text.to_string()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_waits_for_in_flight_event() {
        let temp = TempDir::new().unwrap();
        let (context, task) = context(&temp);

        // Another callback is mid-dispatch
        let guard = context.normalizer.lock().await;

        let pending = tokio::spawn({
            let context = context.clone();
            async move { context.dispatch(dialer("0:01")).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!pending.is_finished());
        assert_eq!(context.coordinator().status().await.unwrap().state, CallState::Idle);

        drop(guard);
        assert_eq!(pending.await.unwrap(), Ok(1));
        assert_eq!(context.coordinator().status().await.unwrap().state, CallState::Active);

        context.coordinator().shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callbacks_keep_event_signals_together() {
        let temp = TempDir::new().unwrap();
        let (context, task) = context(&temp);

        // Each event carries active and ending evidence; a call must end up in
        // grace no matter how the callbacks race.
        let callers: Vec<_> = (0..16)
            .map(|i| {
                let context = context.clone();
                tokio::spawn(async move {
                    context
                        .dispatch(RawEvent::UiObservation {
                            package_name: "com.android.dialer".to_string(),
                            class_name: String::new(),
                            text: vec![format!("0:{:02}", i), "Call ended".to_string()],
                        })
                        .await
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Ok(2));
        }

        let status = context.coordinator().status().await.unwrap();
        assert_eq!(status.state, CallState::Grace);
        assert!(status.grace_armed);

        context.coordinator().shutdown().await.unwrap();
        task.await.unwrap();
    }
}
