//! Recording engine.
//!
//! Owns at most one active recording. Starting negotiates a capture source
//! with the backend in a fixed order, because device policy silently refuses
//! some sources; stopping always finalizes and then checks what actually
//! landed on disk.
//!
//! The engine is driven from its own task by [`RecorderWorker`] so capture
//! setup and file I/O never block the call coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{CaptureBackend, CaptureRequest, CaptureStream};
use crate::domain::{
    CaptureSource, ControlAction, EncoderSettings, JobStatus, RecordingControl, RecordingJob,
};

/// Queue depth for recorder requests
const REQUEST_BUFFER: usize = 32;

/// Platform capabilities, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The platform may allow capturing the call path directly
    pub call_path_capture: bool,

    /// Foreground execution can be typed as microphone use
    pub typed_foreground: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            call_path_capture: true,
            typed_foreground: true,
        }
    }
}

/// Where and how recordings are written
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub recordings_dir: PathBuf,

    /// Negotiation order, first acceptance wins
    pub sources: Vec<CaptureSource>,

    pub encoder: EncoderSettings,
}

impl RecorderSettings {
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            sources: CaptureSource::DEFAULT_ORDER.to_vec(),
            encoder: EncoderSettings::default(),
        }
    }
}

/// A capture source the backend refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedSource {
    pub source: CaptureSource,
    pub reason: String,
}

/// Reasons a recording could not start
#[derive(Debug, Clone, Error)]
pub enum RecorderError {
    #[error("missing permissions: {}", .missing.join(", "))]
    PermissionDenied { missing: Vec<String> },

    #[error("all capture backends rejected configuration ({} tried)", .attempts.len())]
    AllBackendsRejected { attempts: Vec<RejectedSource> },

    #[error("recordings directory unavailable: {}: {reason}", .path.display())]
    Storage { path: PathBuf, reason: String },

    #[error("failed to prepare {}: {reason}", .path.display())]
    PrepareFailed { path: PathBuf, reason: String },

    #[error("failed to start {}: {reason}", .path.display())]
    StartFailed { path: PathBuf, reason: String },
}

/// Non-fatal problems found while stopping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeWarning {
    #[error("finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("recording output is empty: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("recording output is missing: {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Result of a stop request
#[derive(Debug, Clone)]
pub enum StopOutcome {
    Stopped {
        job: RecordingJob,
        warnings: Vec<FinalizeWarning>,
    },
    NoActiveJob,
}

struct ActiveCapture {
    job: RecordingJob,
    stream: Box<dyn CaptureStream>,
}

pub struct RecordingEngine {
    backend: Arc<dyn CaptureBackend>,
    settings: RecorderSettings,
    capabilities: Capabilities,
    active: Option<ActiveCapture>,
    last_job: Option<RecordingJob>,
}

impl RecordingEngine {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        settings: RecorderSettings,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            backend,
            settings,
            capabilities,
            active: None,
            last_job: None,
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The active job, if any
    pub fn current_job(&self) -> Option<&RecordingJob> {
        self.active.as_ref().map(|a| &a.job)
    }

    /// The most recently finished (stopped or failed) job
    pub fn last_job(&self) -> Option<&RecordingJob> {
        self.last_job.as_ref()
    }

    /// Sources to try, in order, after applying platform capabilities
    pub fn negotiation_order(&self) -> Vec<CaptureSource> {
        self.settings
            .sources
            .iter()
            .copied()
            .filter(|s| *s != CaptureSource::VoiceCall || self.capabilities.call_path_capture)
            .collect()
    }

    /// Start recording for `session_id`.
    ///
    /// Returns the existing job if this session is already recording. A job
    /// left over from another session is stopped first.
    #[instrument(skip(self), fields(backend = %self.backend.name()))]
    pub async fn start(&mut self, session_id: u64) -> Result<RecordingJob, RecorderError> {
        if let Some(job) = self.current_job().filter(|job| job.session_id == session_id) {
            debug!("Recording already active for session");
            return Ok(job.clone());
        }

        let stale = self.current_job().map(|job| job.session_id);
        if let Some(stale_session) = stale {
            warn!(stale_session, "Stopping recording left over from another session");
            self.stop_active().await;
        }

        let missing = self.backend.missing_permissions().await;
        if !missing.is_empty() {
            return Err(RecorderError::PermissionDenied { missing });
        }

        let mut stream = self.negotiate().await?;
        let source = stream.source();

        let dir = &self.settings.recordings_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            let _ = stream.finalize().await;
            return Err(RecorderError::Storage {
                path: dir.clone(),
                reason: e.to_string(),
            });
        }

        let output_path = next_output_path(dir, self.settings.encoder.container.extension());
        let mut job = RecordingJob::new(session_id, output_path.clone(), source);

        if let Err(e) = stream.prepare(&output_path).await {
            self.fail_job(job, stream).await;
            return Err(RecorderError::PrepareFailed {
                path: output_path,
                reason: e.to_string(),
            });
        }

        if let Err(e) = stream.start().await {
            self.fail_job(job, stream).await;
            return Err(RecorderError::StartFailed {
                path: output_path,
                reason: e.to_string(),
            });
        }

        job.status = JobStatus::Active;
        info!(%source, path = %output_path.display(), "Recording started");

        self.active = Some(ActiveCapture {
            job: job.clone(),
            stream,
        });

        Ok(job)
    }

    /// Stop the recording owned by `session_id`.
    ///
    /// A stop with nothing to stop, or for a session that does not own the
    /// active job, is a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&mut self, session_id: u64) -> StopOutcome {
        let owner = self.current_job().map(|job| job.session_id);
        match owner {
            Some(owner) if owner == session_id => self.stop_active().await,
            Some(owner) => {
                debug!(owner, "Ignoring stop for another session");
                StopOutcome::NoActiveJob
            }
            None => {
                debug!("No active recording");
                StopOutcome::NoActiveJob
            }
        }
    }

    /// Stop whatever is recording
    pub async fn stop_active(&mut self) -> StopOutcome {
        let Some(ActiveCapture { mut job, mut stream }) = self.active.take() else {
            return StopOutcome::NoActiveJob;
        };

        let mut warnings = Vec::new();

        if let Err(e) = stream.finalize().await {
            warn!(session_id = job.session_id, error = %e, "Finalize failed");
            warnings.push(FinalizeWarning::FinalizeFailed(e.to_string()));
        }
        drop(stream);

        match tokio::fs::metadata(&job.output_path).await {
            Ok(meta) => {
                job.bytes_written = meta.len();
                if meta.len() == 0 {
                    warnings.push(FinalizeWarning::EmptyOutput(job.output_path.clone()));
                }
            }
            Err(_) => {
                warnings.push(FinalizeWarning::MissingOutput(job.output_path.clone()));
            }
        }

        job.status = JobStatus::Stopped;
        job.stopped_at = Some(Utc::now());

        for warning in &warnings {
            warn!(session_id = job.session_id, %warning, "Recording finished with a problem");
        }
        info!(
            session_id = job.session_id,
            bytes = job.bytes_written,
            path = %job.output_path.display(),
            "Recording stopped"
        );

        self.last_job = Some(job.clone());
        StopOutcome::Stopped { job, warnings }
    }

    async fn negotiate(&self) -> Result<Box<dyn CaptureStream>, RecorderError> {
        let mut attempts = Vec::new();

        for source in self.negotiation_order() {
            let request = CaptureRequest {
                source,
                encoder: self.settings.encoder.clone(),
                typed_foreground: self.capabilities.typed_foreground,
            };

            match self.backend.configure(&request).await {
                Ok(stream) => {
                    debug!(%source, rejected = attempts.len(), "Capture source accepted");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%source, error = %e, "Capture source rejected");
                    attempts.push(RejectedSource {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(RecorderError::AllBackendsRejected { attempts })
    }

    /// Release a stream that failed to come up. The partial file stays.
    async fn fail_job(&mut self, mut job: RecordingJob, mut stream: Box<dyn CaptureStream>) {
        if let Err(e) = stream.finalize().await {
            debug!(error = %e, "Releasing failed capture");
        }
        job.status = JobStatus::Failed;
        job.stopped_at = Some(Utc::now());
        self.last_job = Some(job);
    }
}

/// `<dir>/call_<YYYYMMDD_HHmmss>.<ext>`, suffixed when two recordings land in
/// the same second
fn next_output_path(dir: &Path, extension: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut path = dir.join(format!("call_{}.{}", stamp, extension));

    let mut n = 2;
    while path.exists() {
        path = dir.join(format!("call_{}_{}.{}", stamp, n, extension));
        n += 1;
    }

    path
}

/// Outcome of a control, delivered back to the coordinator
#[derive(Debug, Clone)]
pub enum RecorderReply {
    Started {
        session_id: u64,
        job: RecordingJob,
    },
    StartFailed {
        session_id: u64,
        error: RecorderError,
    },
    Stopped {
        session_id: u64,
        job: RecordingJob,
        warnings: Vec<FinalizeWarning>,
    },
    NothingToStop {
        session_id: u64,
    },
}

/// Snapshot of the engine's state
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub is_recording: bool,
    pub current_job: Option<RecordingJob>,
    pub last_job: Option<RecordingJob>,
}

enum RecorderRequest {
    Control(RecordingControl),
    Status(oneshot::Sender<RecorderStatus>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Error)]
#[error("recorder worker has shut down")]
pub struct RecorderGone;

/// Sending side of the recorder worker
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderRequest>,
}

impl RecorderHandle {
    /// Queue a control; the outcome arrives as a [`RecorderReply`]
    pub async fn send(&self, control: RecordingControl) -> Result<(), RecorderGone> {
        self.tx
            .send(RecorderRequest::Control(control))
            .await
            .map_err(|_| RecorderGone)
    }

    /// Engine status, answered after every control queued before it
    pub async fn status(&self) -> Result<RecorderStatus, RecorderGone> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Status(tx))
            .await
            .map_err(|_| RecorderGone)?;
        rx.await.map_err(|_| RecorderGone)
    }

    /// Process everything queued so far, stop any recording, then exit
    pub async fn shutdown(&self) -> Result<(), RecorderGone> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Shutdown(tx))
            .await
            .map_err(|_| RecorderGone)?;
        rx.await.map_err(|_| RecorderGone)
    }
}

/// Task that owns a [`RecordingEngine`]
pub struct RecorderWorker {
    engine: RecordingEngine,
    requests: mpsc::Receiver<RecorderRequest>,
    replies: mpsc::UnboundedSender<RecorderReply>,
}

impl RecorderWorker {
    pub fn spawn(
        engine: RecordingEngine,
        replies: mpsc::UnboundedSender<RecorderReply>,
    ) -> (RecorderHandle, JoinHandle<()>) {
        let (tx, requests) = mpsc::channel(REQUEST_BUFFER);

        let worker = Self {
            engine,
            requests,
            replies,
        };
        let task = tokio::spawn(worker.run());

        (RecorderHandle { tx }, task)
    }

    async fn run(mut self) {
        debug!("Recorder worker started");

        while let Some(request) = self.requests.recv().await {
            match request {
                RecorderRequest::Control(control) => {
                    let reply = self.handle(control).await;
                    // The coordinator may already be gone during teardown.
                    let _ = self.replies.send(reply);
                }
                RecorderRequest::Status(tx) => {
                    let _ = tx.send(self.status());
                }
                RecorderRequest::Shutdown(ack) => {
                    self.release().await;
                    let _ = ack.send(());
                    debug!("Recorder worker stopped");
                    return;
                }
            }
        }

        self.release().await;
        debug!("Recorder worker stopped (all handles dropped)");
    }

    async fn handle(&mut self, control: RecordingControl) -> RecorderReply {
        let session_id = control.session_id;

        match control.action {
            ControlAction::Start => match self.engine.start(session_id).await {
                Ok(job) => RecorderReply::Started { session_id, job },
                Err(e) => {
                    error!(session_id, error = %e, "Recording failed to start");
                    RecorderReply::StartFailed {
                        session_id,
                        error: e,
                    }
                }
            },
            ControlAction::Stop => match self.engine.stop(session_id).await {
                StopOutcome::Stopped { job, warnings } => RecorderReply::Stopped {
                    session_id,
                    job,
                    warnings,
                },
                StopOutcome::NoActiveJob => RecorderReply::NothingToStop { session_id },
            },
        }
    }

    fn status(&self) -> RecorderStatus {
        RecorderStatus {
            is_recording: self.engine.is_recording(),
            current_job: self.engine.current_job().cloned(),
            last_job: self.engine.last_job().cloned(),
        }
    }

    async fn release(&mut self) {
        if let StopOutcome::Stopped { job, warnings } = self.engine.stop_active().await {
            warn!(session_id = job.session_id, "Recording stopped by worker shutdown");
            let _ = self.replies.send(RecorderReply::Stopped {
                session_id: job.session_id,
                job,
                warnings,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedBackend;
    use crate::domain::Container;
    use tempfile::TempDir;

    fn engine(backend: SimulatedBackend, dir: &Path) -> RecordingEngine {
        let mut settings = RecorderSettings::new(dir.join("recordings"));
        settings.encoder.container = Container::Wav;
        RecordingEngine::new(Arc::new(backend), settings, Capabilities::default())
    }

    #[test]
    fn test_output_path_format() {
        let temp = TempDir::new().unwrap();
        let path = next_output_path(temp.path(), "m4a");
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("call_"));
        assert!(name.ends_with(".m4a"));
        // call_ + YYYYMMDD_HHmmss + .m4a
        assert_eq!(name.len(), 5 + 15 + 4);
    }

    #[test]
    fn test_output_path_avoids_collision() {
        let temp = TempDir::new().unwrap();
        let first = next_output_path(temp.path(), "wav");
        std::fs::write(&first, b"x").unwrap();

        let second = next_output_path(temp.path(), "wav");
        assert_ne!(first, second);
    }

    #[test]
    fn test_call_path_skipped_without_capability() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(SimulatedBackend::new(), temp.path());
        assert_eq!(engine.negotiation_order()[0], CaptureSource::VoiceCall);

        engine.capabilities.call_path_capture = false;
        assert_eq!(engine.negotiation_order()[0], CaptureSource::VoiceCommunication);
        assert_eq!(engine.negotiation_order().len(), 4);
    }

    #[tokio::test]
    async fn test_prepare_failure_marks_job_failed() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(SimulatedBackend::new().failing_prepare(), temp.path());

        let path = match engine.start(1).await {
            Err(RecorderError::PrepareFailed { path, .. }) => path,
            other => panic!("expected PrepareFailed, got {other:?}"),
        };

        // Partial file is left in place
        assert!(path.exists());
        assert!(!engine.is_recording());
        assert_eq!(engine.last_job().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_stop_for_other_session_is_ignored() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(SimulatedBackend::new(), temp.path());

        engine.start(1).await.unwrap();
        assert!(matches!(engine.stop(2).await, StopOutcome::NoActiveJob));
        assert!(engine.is_recording());

        assert!(matches!(engine.stop(1).await, StopOutcome::Stopped { .. }));
    }

    #[tokio::test]
    async fn test_start_for_new_session_replaces_stale_job() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(SimulatedBackend::new(), temp.path());

        engine.start(1).await.unwrap();
        let job = engine.start(2).await.unwrap();

        assert_eq!(job.session_id, 2);
        assert_eq!(engine.last_job().unwrap().session_id, 1);
        assert_eq!(engine.last_job().unwrap().status, JobStatus::Stopped);
    }

    #[test]
    fn test_engine_futures_are_send() {
        fn assert_send<T: Send>(_: &T) {}

        let temp = TempDir::new().unwrap();
        let mut engine = engine(SimulatedBackend::new(), temp.path());

        // The worker runs these inside a spawned task
        let start = engine.start(1);
        assert_send(&start);
        drop(start);
        let stop = engine.stop(1);
        assert_send(&stop);
        drop(stop);
        let stop_active = engine.stop_active();
        assert_send(&stop_active);
    }

    #[tokio::test]
    async fn test_worker_replies_in_order() {
        let temp = TempDir::new().unwrap();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let (handle, task) =
            RecorderWorker::spawn(engine(SimulatedBackend::new(), temp.path()), reply_tx);

        handle.send(RecordingControl::start(5)).await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.is_recording);

        handle.send(RecordingControl::stop(5)).await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(reply_rx.recv().await, Some(RecorderReply::Started { session_id: 5, .. })));
        assert!(matches!(reply_rx.recv().await, Some(RecorderReply::Stopped { session_id: 5, .. })));
    }

    #[tokio::test]
    async fn test_worker_shutdown_stops_recording() {
        let temp = TempDir::new().unwrap();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let (handle, task) =
            RecorderWorker::spawn(engine(SimulatedBackend::new(), temp.path()), reply_tx);

        handle.send(RecordingControl::start(9)).await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(reply_rx.recv().await, Some(RecorderReply::Started { .. })));
        assert!(matches!(reply_rx.recv().await, Some(RecorderReply::Stopped { session_id: 9, .. })));
        assert!(handle.status().await.is_err());
    }
}
