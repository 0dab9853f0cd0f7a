//! Call lifecycle coordinator.
//!
//! A single task owns the live [`CallSession`] and consumes normalized
//! signals, recorder replies and manual controls from channels, so every
//! transition is applied in one place and in order:
//!
//! ```text
//! IDLE ──(authoritative ringing)──▶ RINGING ──(active)──▶ ACTIVE
//!   ▲                                  │                    │ ▲
//!   │                                  │ authoritative      │ │ active
//!   │                                  │ ending             ▼ │
//!   └──────────────────────────────────┴──── grace expiry ─ GRACE
//! ```
//!
//! Ending signals never stop a recording directly. They open a grace
//! period; another active signal inside it cancels the stop, so UI flapping
//! in third-party dialers does not split a call into several recordings.
//! Authoritative call removal skips the grace period.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    CallSession, CallState, JournalEntry, JournalEventType, RecordingControl, RecordingJob, Signal,
    SignalKind, SignalSource,
};

use super::debounce::DebounceTimer;
use super::journal::JournalSender;
use super::recorder::{RecorderHandle, RecorderReply, RecorderWorker, RecordingEngine};
use super::route::{AudioRouteController, RouteState};

/// Queue depth for inbound commands
const COMMAND_BUFFER: usize = 256;

/// Default end-of-call grace period
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1500);

/// Tunables for the lifecycle state machine
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// How long an ending signal must go uncontradicted before the call ends
    pub grace_period: Duration,

    /// Start recording automatically when a call becomes active
    pub auto_record: bool,

    /// Route call audio to the speaker while a call is active
    pub force_speaker: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            auto_record: true,
            force_speaker: true,
        }
    }
}

/// Errors returned to callers of [`CoordinatorHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no active call")]
    NoActiveCall,

    #[error("call coordinator has shut down")]
    CoordinatorGone,
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    /// Identifies this coordinator run in the journal
    pub run_id: Uuid,
    pub state: CallState,
    pub session_id: Option<u64>,
    pub is_recording: bool,
    pub start_pending: bool,
    pub recording: Option<RecordingJob>,
    pub route: RouteState,
    pub grace_armed: bool,
    pub sessions_completed: u64,
}

type Reply = oneshot::Sender<Result<(), ControlError>>;

enum Command {
    Signal(Signal),
    StartRecording(Reply),
    StopRecording(Reply),
    ForceSpeaker(Reply),
    RestoreRoute(Reply),
    Status(oneshot::Sender<CoordinatorStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running coordinator.
///
/// Dropping every handle shuts the coordinator down the same way
/// [`CoordinatorHandle::shutdown`] does.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Deliver a normalized signal
    pub async fn signal(&self, signal: Signal) -> Result<(), ControlError> {
        self.tx
            .send(Command::Signal(signal))
            .await
            .map_err(|_| ControlError::CoordinatorGone)
    }

    /// Start recording the current call (manual record toggle)
    pub async fn start_recording(&self) -> Result<(), ControlError> {
        self.request(Command::StartRecording).await
    }

    /// Stop recording the current call; suppresses automatic restart
    pub async fn stop_recording(&self) -> Result<(), ControlError> {
        self.request(Command::StopRecording).await
    }

    pub async fn force_speaker(&self) -> Result<(), ControlError> {
        self.request(Command::ForceSpeaker).await
    }

    pub async fn restore_route(&self) -> Result<(), ControlError> {
        self.request(Command::RestoreRoute).await
    }

    pub async fn status(&self) -> Result<CoordinatorStatus, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Status(tx))
            .await
            .map_err(|_| ControlError::CoordinatorGone)?;
        rx.await.map_err(|_| ControlError::CoordinatorGone)
    }

    pub async fn is_recording(&self) -> Result<bool, ControlError> {
        Ok(self.status().await?.is_recording)
    }

    pub async fn current_route(&self) -> Result<RouteState, ControlError> {
        Ok(self.status().await?.route)
    }

    /// End any call in progress, release the recorder and wait for the
    /// coordinator to exit
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown(tx))
            .await
            .map_err(|_| ControlError::CoordinatorGone)?;
        rx.await.map_err(|_| ControlError::CoordinatorGone)
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), ControlError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ControlError::CoordinatorGone)?;
        rx.await.map_err(|_| ControlError::CoordinatorGone)?
    }
}

/// The call lifecycle state machine
pub struct Coordinator {
    run_id: Uuid,
    settings: LifecycleSettings,
    commands: mpsc::Receiver<Command>,
    timer: DebounceTimer,

    /// Strongest source behind the pending grace period
    grace_source: Option<SignalSource>,

    route: AudioRouteController,
    recorder: RecorderHandle,
    recorder_task: Option<JoinHandle<()>>,
    replies: mpsc::UnboundedReceiver<RecorderReply>,
    journal: JournalSender,

    session: Option<CallSession>,
    next_session_id: u64,
    sessions_completed: u64,
}

impl Coordinator {
    /// Start the coordinator and its recorder worker
    pub fn spawn(
        settings: LifecycleSettings,
        engine: RecordingEngine,
        route: AudioRouteController,
        journal: JournalSender,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (recorder, recorder_task) = RecorderWorker::spawn(engine, reply_tx);

        let coordinator = Self {
            run_id: Uuid::new_v4(),
            timer: DebounceTimer::new(settings.grace_period),
            settings,
            commands,
            grace_source: None,
            route,
            recorder,
            recorder_task: Some(recorder_task),
            replies,
            journal,
            session: None,
            next_session_id: 1,
            sessions_completed: 0,
        };

        let task = tokio::spawn(coordinator.run());
        (CoordinatorHandle { tx }, task)
    }

    async fn run(mut self) {
        info!(
            run_id = %self.run_id,
            grace_ms = self.settings.grace_period.as_millis() as u64,
            "Call coordinator started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.timer.expired() => self.on_grace_expired().await,

                Some(reply) = self.replies.recv() => self.on_recorder_reply(reply),

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!("All coordinator handles dropped");
                        self.shutdown().await;
                        return;
                    }
                },
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Signal(signal) => self.on_signal(signal).await,
            Command::StartRecording(reply) => {
                let _ = reply.send(self.manual_start().await);
            }
            Command::StopRecording(reply) => {
                let _ = reply.send(self.manual_stop().await);
            }
            Command::ForceSpeaker(reply) => {
                let _ = reply.send(self.manual_force_speaker());
            }
            Command::RestoreRoute(reply) => {
                let _ = reply.send(self.manual_restore_route());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            // Handled by the run loop
            Command::Shutdown(_) => {}
        }
    }

    #[instrument(skip_all, fields(kind = ?signal.kind, source = ?signal.source))]
    async fn on_signal(&mut self, signal: Signal) {
        match signal.kind {
            SignalKind::Active => self.on_active(signal).await,
            SignalKind::Indeterminate => self.on_indeterminate(signal),
            SignalKind::Ending => self.on_ending(signal).await,
        }
    }

    async fn on_active(&mut self, signal: Signal) {
        let heuristic = !signal.is_authoritative();

        match self.session {
            None => {
                self.open_session(CallState::Active, &signal);
            }
            Some(ref mut session) => {
                if session.state == CallState::Grace {
                    if heuristic && self.grace_source == Some(SignalSource::Authoritative) {
                        info!(
                            session_id = session.session_id,
                            package = %signal.origin_package,
                            "Heuristic active signal is advisory; authoritative end stands"
                        );
                        return;
                    }
                    self.timer.cancel();
                    self.grace_source = None;
                    info!(session_id = session.session_id, "End signal withdrawn; call continues");
                }
                if session.state != CallState::Active {
                    let previous = session.state;
                    session.state = CallState::Active;
                    let id = session.session_id;
                    self.journal_state(id, previous, CallState::Active);
                }
            }
        }

        if let Some(ref mut session) = self.session {
            if signal.is_authoritative() {
                session.last_authoritative_signal_at = Some(signal.at);
            }
        }

        self.maybe_force_speaker();
        self.maybe_start_recording().await;
    }

    fn on_indeterminate(&mut self, signal: Signal) {
        if self.session.is_some() {
            debug!("Ringing signal during a call ignored");
            return;
        }
        if !signal.is_authoritative() {
            debug!("Heuristic ringing signal ignored");
            return;
        }

        self.open_session(CallState::Ringing, &signal);
        if let Some(ref mut session) = self.session {
            session.last_authoritative_signal_at = Some(signal.at);
        }
    }

    async fn on_ending(&mut self, signal: Signal) {
        let Some(ref mut session) = self.session else {
            debug!("End signal with no call ignored");
            return;
        };

        if signal.is_authoritative() {
            session.last_authoritative_signal_at = Some(signal.at);
        }

        match session.state {
            CallState::Ringing => {
                if signal.is_authoritative() {
                    self.end_session("call ended before it was answered").await;
                } else {
                    debug!("Heuristic end signal while ringing ignored");
                }
            }
            CallState::Active | CallState::Grace => {
                if signal.is_removal() {
                    info!(session_id = session.session_id, "Call removed; ending immediately");
                    self.end_session("call removed").await;
                    return;
                }

                if !signal.is_authoritative() && session.has_authoritative_signal() {
                    info!(
                        session_id = session.session_id,
                        package = %signal.origin_package,
                        "Heuristic end signal is advisory for this call"
                    );
                }

                if session.state == CallState::Active {
                    session.state = CallState::Grace;
                    let id = session.session_id;
                    self.journal_state(id, CallState::Active, CallState::Grace);
                }

                self.timer.arm();
                if self.grace_source != Some(SignalSource::Authoritative) {
                    self.grace_source = Some(signal.source);
                }
                debug!(grace_ms = self.timer.period().as_millis() as u64, "Grace period armed");
            }
            CallState::Idle => {}
        }
    }

    async fn on_grace_expired(&mut self) {
        match self.session {
            Some(ref session) if session.state == CallState::Grace => {
                info!(session_id = session.session_id, "Grace period elapsed; call over");
                self.end_session("call ended").await;
            }
            _ => debug!("Stale grace expiry ignored"),
        }
    }

    fn open_session(&mut self, state: CallState, signal: &Signal) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        info!(session_id, state = state.as_str(), source = ?signal.source, "Call session started");
        self.record(JournalEntry::new(
            session_id,
            JournalEventType::SessionStarted,
            format!("Session started ({})", state.as_str()),
        ));

        self.session = Some(CallSession::new(session_id, state, Utc::now()));
    }

    /// Stop, restore and destroy the session
    async fn end_session(&mut self, reason: &str) {
        self.timer.cancel();
        self.grace_source = None;

        let Some(session) = self.session.take() else {
            return;
        };
        let session_id = session.session_id;

        if session.needs_stop() {
            if let Err(e) = self.recorder.send(RecordingControl::stop(session_id)).await {
                error!(session_id, error = %e, "Could not request recording stop");
            }
        }

        if let Some(snapshot) = self.route.restore() {
            self.record(JournalEntry::new(
                session_id,
                JournalEventType::RouteRestored,
                format!("Route restored to {}", snapshot.previous),
            ));
        }

        self.sessions_completed += 1;
        info!(session_id, reason, "Call session ended");
        self.record(JournalEntry::new(
            session_id,
            JournalEventType::SessionEnded,
            format!("Session ended: {}", reason),
        ));
    }

    async fn maybe_start_recording(&mut self) {
        if !self.settings.auto_record {
            return;
        }
        let Some(ref mut session) = self.session else {
            return;
        };
        if session.state != CallState::Active
            || session.recording_attempted
            || session.start_pending
            || session.is_recording()
        {
            return;
        }

        session.recording_attempted = true;
        self.request_start().await;
    }

    async fn request_start(&mut self) {
        let Some(ref mut session) = self.session else {
            return;
        };
        let session_id = session.session_id;
        session.start_pending = true;

        if let Err(e) = self.recorder.send(RecordingControl::start(session_id)).await {
            error!(session_id, error = %e, "Could not request recording start");
            session.start_pending = false;
        }
    }

    fn maybe_force_speaker(&mut self) {
        if !self.settings.force_speaker {
            return;
        }
        match self.session {
            Some(ref session) if session.state == CallState::Active && !session.speaker_requested => {}
            _ => return,
        }
        self.apply_force_speaker();
    }

    fn apply_force_speaker(&mut self) {
        let Some(ref mut session) = self.session else {
            return;
        };
        session.speaker_requested = true;
        let session_id = session.session_id;

        match self.route.force_speaker(session_id) {
            Ok(previous) => {
                let first_force = !session.route_forced;
                session.route_forced = true;
                if first_force {
                    self.record(JournalEntry::new(
                        session_id,
                        JournalEventType::RouteForced,
                        format!("Speaker forced (was {})", previous),
                    ));
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to force speaker");
            }
        }
    }

    fn on_recorder_reply(&mut self, reply: RecorderReply) {
        match reply {
            RecorderReply::Started { session_id, job } => {
                self.record(
                    JournalEntry::new(
                        session_id,
                        JournalEventType::RecordingStarted,
                        format!("Recording with {}", job.backend),
                    )
                    .with_output(job.output_path.clone()),
                );
                if let Some(session) = self.current_session_mut(session_id) {
                    session.start_pending = false;
                    session.recording = Some(job);
                }
            }
            RecorderReply::StartFailed { session_id, error } => {
                warn!(session_id, error = %error, "Recording unavailable; call continues");
                self.record(
                    JournalEntry::new(session_id, JournalEventType::RecordingFailed, "Recording failed to start")
                        .with_error(error.to_string()),
                );
                if let Some(session) = self.current_session_mut(session_id) {
                    session.start_pending = false;
                }
            }
            RecorderReply::Stopped {
                session_id,
                job,
                warnings,
            } => {
                let mut entry = JournalEntry::new(
                    session_id,
                    JournalEventType::RecordingStopped,
                    format!("Recording stopped ({} bytes)", job.bytes_written),
                )
                .with_output(job.output_path.clone());
                if !warnings.is_empty() {
                    let text: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
                    entry = entry.with_error(text.join("; "));
                }
                self.record(entry);

                if let Some(session) = self.current_session_mut(session_id) {
                    session.recording = None;
                    session.start_pending = false;
                }
            }
            RecorderReply::NothingToStop { session_id } => {
                debug!(session_id, "Recorder had nothing to stop");
                if let Some(session) = self.current_session_mut(session_id) {
                    session.recording = None;
                    session.start_pending = false;
                }
            }
        }
    }

    fn current_session_mut(&mut self, session_id: u64) -> Option<&mut CallSession> {
        self.session
            .as_mut()
            .filter(|s| s.session_id == session_id)
    }

    async fn manual_start(&mut self) -> Result<(), ControlError> {
        let session = self.session.as_mut().ok_or(ControlError::NoActiveCall)?;
        if session.is_recording() || session.start_pending {
            return Ok(());
        }

        info!(session_id = session.session_id, "Manual recording start");
        session.recording_attempted = true;
        self.request_start().await;
        Ok(())
    }

    async fn manual_stop(&mut self) -> Result<(), ControlError> {
        let session = self.session.as_mut().ok_or(ControlError::NoActiveCall)?;
        let session_id = session.session_id;

        // No automatic restart once the user has stopped the recording.
        session.recording_attempted = true;

        if !session.needs_stop() {
            return Ok(());
        }

        info!(session_id, "Manual recording stop");
        if let Err(e) = self.recorder.send(RecordingControl::stop(session_id)).await {
            error!(session_id, error = %e, "Could not request recording stop");
        }
        Ok(())
    }

    fn manual_force_speaker(&mut self) -> Result<(), ControlError> {
        if self.session.is_none() {
            return Err(ControlError::NoActiveCall);
        }
        self.apply_force_speaker();
        Ok(())
    }

    fn manual_restore_route(&mut self) -> Result<(), ControlError> {
        let session = self.session.as_mut().ok_or(ControlError::NoActiveCall)?;
        session.speaker_requested = true;
        session.route_forced = false;
        let session_id = session.session_id;

        if let Some(snapshot) = self.route.restore() {
            self.record(JournalEntry::new(
                session_id,
                JournalEventType::RouteRestored,
                format!("Route restored to {}", snapshot.previous),
            ));
        }
        Ok(())
    }

    fn status(&self) -> CoordinatorStatus {
        let session = self.session.as_ref();
        CoordinatorStatus {
            run_id: self.run_id,
            state: session.map(|s| s.state).unwrap_or_default(),
            session_id: session.map(|s| s.session_id),
            is_recording: session.map(|s| s.is_recording()).unwrap_or(false),
            start_pending: session.map(|s| s.start_pending).unwrap_or(false),
            recording: session.and_then(|s| s.recording.clone()),
            route: self.route.current_route(),
            grace_armed: self.timer.is_armed(),
            sessions_completed: self.sessions_completed,
        }
    }

    fn record(&self, entry: JournalEntry) {
        self.journal.record(entry.in_run(self.run_id));
    }

    fn journal_state(&self, session_id: u64, from: CallState, to: CallState) {
        debug!(session_id, from = from.as_str(), to = to.as_str(), "State changed");
        self.record(JournalEntry::new(
            session_id,
            JournalEventType::StateChanged,
            format!("{} -> {}", from.as_str(), to.as_str()),
        ));
    }

    async fn shutdown(&mut self) {
        info!("Call coordinator shutting down");

        if self.session.is_some() {
            self.end_session("coordinator shutdown").await;
        } else {
            self.timer.cancel();
            self.route.restore();
        }

        if let Err(e) = self.recorder.shutdown().await {
            warn!(error = %e, "Recorder worker already stopped");
        }

        while let Ok(reply) = self.replies.try_recv() {
            self.on_recorder_reply(reply);
        }

        if let Some(task) = self.recorder_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Recorder worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::{RouteMode, SimulatedBackend, SimulatedRouter};
    use crate::core::recorder::{Capabilities, RecorderSettings};
    use crate::domain::{Container, SignalCause};
    use tempfile::TempDir;

    fn spawn(temp: &TempDir) -> (CoordinatorHandle, JoinHandle<()>, SimulatedRouter) {
        let mut recorder = RecorderSettings::new(temp.path().join("recordings"));
        recorder.encoder.container = Container::Wav;
        let engine = RecordingEngine::new(
            Arc::new(SimulatedBackend::new()),
            recorder,
            Capabilities::default(),
        );
        let router = SimulatedRouter::new(RouteMode::Earpiece);
        let route = AudioRouteController::new(Box::new(router.clone()));

        let (handle, task) = Coordinator::spawn(
            LifecycleSettings::default(),
            engine,
            route,
            JournalSender::disabled(),
        );
        (handle, task, router)
    }

    fn signal(kind: SignalKind, cause: SignalCause) -> Signal {
        Signal::authoritative(kind, cause, Utc::now())
    }

    #[tokio::test]
    async fn test_ringing_then_rejected_records_nothing() {
        let temp = TempDir::new().unwrap();
        let (handle, task, router) = spawn(&temp);

        handle
            .signal(signal(SignalKind::Indeterminate, SignalCause::CallState))
            .await
            .unwrap();
        assert_eq!(handle.status().await.unwrap().state, CallState::Ringing);

        handle
            .signal(signal(SignalKind::Ending, SignalCause::CallState))
            .await
            .unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, CallState::Idle);
        assert_eq!(status.sessions_completed, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(router.history().is_empty());
    }

    #[tokio::test]
    async fn test_manual_controls_need_a_call() {
        let temp = TempDir::new().unwrap();
        let (handle, task, _router) = spawn(&temp);

        assert_eq!(handle.start_recording().await, Err(ControlError::NoActiveCall));
        assert_eq!(handle.stop_recording().await, Err(ControlError::NoActiveCall));
        assert_eq!(handle.force_speaker().await, Err(ControlError::NoActiveCall));
        assert_eq!(handle.restore_route().await, Err(ControlError::NoActiveCall));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.status().await.unwrap_err(), ControlError::CoordinatorGone);
    }

    #[tokio::test]
    async fn test_dropping_handles_shuts_down() {
        let temp = TempDir::new().unwrap();
        let (handle, task, router) = spawn(&temp);

        handle
            .signal(signal(SignalKind::Active, SignalCause::CallAdded))
            .await
            .unwrap();
        drop(handle);
        task.await.unwrap();

        assert_eq!(router.current(), RouteMode::Earpiece);
        assert_eq!(router.history(), vec![RouteMode::Speaker, RouteMode::Earpiece]);
    }
}
