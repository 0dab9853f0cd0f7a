//! Simulated platform adapters.
//!
//! `SimulatedBackend` accepts a configurable set of capture sources and
//! writes PCM silence as a WAV file for the duration of the capture.
//! `SimulatedRouter` keeps the route in memory and records every change.
//! Both are cheap to clone; clones share state so a caller can inspect what
//! the engine did.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use tokio::task;
use tokio::time::Instant;

use super::{
    AudioRouter, BackendError, CaptureBackend, CaptureRequest, CaptureStream, RouteError,
    RouteMode,
};
use crate::domain::{CaptureSource, Container, EncoderSettings};

/// Longest capture the simulation synthesizes audio for
const MAX_SILENCE_SECS: f64 = 3600.0;

/// Samples handed to the WAV encoder per buffered write
const SILENCE_CHUNK: u32 = 8192;

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_prepare: bool,
    fail_start: bool,
    fail_finalize: bool,
    silent: bool,
}

/// Capture backend that negotiates like a real device and writes silence
#[derive(Clone)]
pub struct SimulatedBackend {
    accepted: HashSet<CaptureSource>,
    missing_permissions: Vec<String>,
    faults: Faults,
    attempts: Arc<Mutex<Vec<CaptureSource>>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// Accept every microphone source; reject call-path capture like most
    /// devices do
    pub fn new() -> Self {
        Self::accepting(&[
            CaptureSource::VoiceCommunication,
            CaptureSource::Mic,
            CaptureSource::VoiceRecognition,
            CaptureSource::Camcorder,
        ])
    }

    /// Accept exactly `sources`
    pub fn accepting(sources: &[CaptureSource]) -> Self {
        Self {
            accepted: sources.iter().copied().collect(),
            missing_permissions: Vec::new(),
            faults: Faults::default(),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `permission` as not granted
    pub fn without_permission(mut self, permission: impl Into<String>) -> Self {
        self.missing_permissions.push(permission.into());
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.faults.fail_prepare = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.faults.fail_start = true;
        self
    }

    pub fn failing_finalize(mut self) -> Self {
        self.faults.fail_finalize = true;
        self
    }

    /// Capture "succeeds" but never writes a byte
    pub fn silent(mut self) -> Self {
        self.faults.silent = true;
        self
    }

    /// Sources tried so far, in order
    pub fn attempts(&self) -> Vec<CaptureSource> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl CaptureBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn missing_permissions(&self) -> Vec<String> {
        self.missing_permissions.clone()
    }

    async fn configure(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>, BackendError> {
        self.attempts.lock().push(request.source);

        if !self.accepted.contains(&request.source) {
            return Err(BackendError::Rejected {
                capture: request.source,
                reason: "blocked by capture policy".to_string(),
            });
        }

        if request.encoder.container != Container::Wav {
            return Err(BackendError::Rejected {
                capture: request.source,
                reason: format!(
                    "simulated backend only encodes wav, not {}",
                    request.encoder.container.extension()
                ),
            });
        }

        Ok(Box::new(SimulatedStream {
            source: request.source,
            encoder: request.encoder.clone(),
            faults: self.faults.clone(),
            output: None,
            writer: None,
            started: None,
        }))
    }
}

struct SimulatedStream {
    source: CaptureSource,
    encoder: EncoderSettings,
    faults: Faults,
    output: Option<PathBuf>,
    writer: Option<WavWriter<BufWriter<File>>>,
    started: Option<Instant>,
}

impl SimulatedStream {
    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.encoder.channels,
            sample_rate: self.encoder.sample_rate_hz,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Interleaved samples covering the time since `start`
    fn samples_due(&self) -> u64 {
        let elapsed = self
            .started
            .map(|s| s.elapsed().as_secs_f64().min(MAX_SILENCE_SECS))
            .unwrap_or(0.0);
        ((elapsed * self.encoder.sample_rate_hz as f64) as u64)
            .saturating_mul(self.encoder.channels as u64)
    }
}

fn write_silence(mut writer: WavWriter<BufWriter<File>>, samples: u64) -> hound::Result<()> {
    let mut remaining = samples;
    while remaining > 0 {
        let chunk = remaining.min(SILENCE_CHUNK as u64) as u32;
        let mut buffer = writer.get_i16_writer(chunk);
        for _ in 0..chunk {
            buffer.write_sample(0i16);
        }
        buffer.flush()?;
        remaining -= chunk as u64;
    }
    writer.finalize()
}

#[async_trait]
impl CaptureStream for SimulatedStream {
    fn source(&self) -> CaptureSource {
        self.source
    }

    async fn prepare(&mut self, output: &Path) -> Result<(), BackendError> {
        self.output = Some(output.to_path_buf());

        let path = output.to_path_buf();
        if self.faults.silent || self.faults.fail_prepare {
            // The platform recorder creates the file before it can fail.
            task::spawn_blocking(move || File::create(path).map(drop))
                .await
                .map_err(|e| BackendError::Prepare(e.to_string()))?
                .map_err(|e| BackendError::Prepare(e.to_string()))?;
            if self.faults.fail_prepare {
                return Err(BackendError::Prepare("simulated prepare failure".to_string()));
            }
            return Ok(());
        }

        let spec = self.spec();
        let writer = task::spawn_blocking(move || WavWriter::create(path, spec))
            .await
            .map_err(|e| BackendError::Prepare(e.to_string()))?
            .map_err(|e| BackendError::Prepare(e.to_string()))?;
        self.writer = Some(writer);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        if self.faults.fail_start {
            return Err(BackendError::Start("simulated start failure".to_string()));
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), BackendError> {
        if self.faults.fail_finalize {
            self.writer = None;
            return Err(BackendError::Finalize("simulated finalize failure".to_string()));
        }

        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let samples = self.samples_due();
        task::spawn_blocking(move || write_silence(writer, samples))
            .await
            .map_err(|e| BackendError::Finalize(e.to_string()))?
            .map_err(|e| BackendError::Finalize(e.to_string()))
    }
}

#[derive(Debug)]
struct RouterState {
    route: RouteMode,
    history: Vec<RouteMode>,
    reject: bool,
}

/// In-memory audio router
#[derive(Debug, Clone)]
pub struct SimulatedRouter {
    state: Arc<Mutex<RouterState>>,
}

impl Default for SimulatedRouter {
    fn default() -> Self {
        Self::new(RouteMode::Earpiece)
    }
}

impl SimulatedRouter {
    pub fn new(initial: RouteMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(RouterState {
                route: initial,
                history: Vec::new(),
                reject: false,
            })),
        }
    }

    /// Every `set_route` call that succeeded, in order
    pub fn history(&self) -> Vec<RouteMode> {
        self.state.lock().history.clone()
    }

    pub fn current(&self) -> RouteMode {
        self.state.lock().route
    }

    /// Make subsequent `set_route` calls fail
    pub fn reject_changes(&self, reject: bool) {
        self.state.lock().reject = reject;
    }
}

impl AudioRouter for SimulatedRouter {
    fn route(&self) -> Result<RouteMode, RouteError> {
        Ok(self.state.lock().route)
    }

    fn set_route(&mut self, mode: RouteMode) -> Result<(), RouteError> {
        let mut state = self.state.lock();
        if state.reject {
            return Err(RouteError::Rejected {
                mode,
                reason: "simulated routing failure".to_string(),
            });
        }
        state.route = mode;
        state.history.push(mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn wav_request(source: CaptureSource) -> CaptureRequest {
        CaptureRequest {
            source,
            encoder: EncoderSettings {
                container: Container::Wav,
                ..Default::default()
            },
            typed_foreground: false,
        }
    }

    #[tokio::test]
    async fn test_default_rejects_call_path() {
        let backend = SimulatedBackend::new();

        let result = backend.configure(&wav_request(CaptureSource::VoiceCall)).await;
        assert!(matches!(result, Err(BackendError::Rejected { .. })));

        assert!(backend.configure(&wav_request(CaptureSource::Mic)).await.is_ok());
        assert_eq!(
            backend.attempts(),
            vec![CaptureSource::VoiceCall, CaptureSource::Mic]
        );
    }

    #[tokio::test]
    async fn test_writes_valid_wav() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.wav");

        let backend = SimulatedBackend::new();
        let mut stream = backend.configure(&wav_request(CaptureSource::Mic)).await.unwrap();
        stream.prepare(&path).await.unwrap();
        stream.start().await.unwrap();
        stream.finalize().await.unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.spec().channels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_matches_capture_time() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.wav");

        let backend = SimulatedBackend::new();
        let mut request = wav_request(CaptureSource::Mic);
        request.encoder.channels = 2;
        let mut stream = backend.configure(&request).await.unwrap();
        stream.prepare(&path).await.unwrap();
        stream.start().await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        stream.finalize().await.unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        // duration() counts frames, len() counts samples
        assert_eq!(reader.duration(), 2 * 44_100);
        assert_eq!(reader.len(), 2 * 2 * 44_100);
    }

    #[tokio::test]
    async fn test_silent_stream_leaves_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.wav");

        let backend = SimulatedBackend::new().silent();
        let mut stream = backend.configure(&wav_request(CaptureSource::Mic)).await.unwrap();
        stream.prepare(&path).await.unwrap();
        stream.start().await.unwrap();
        stream.finalize().await.unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_router_records_history() {
        let mut router = SimulatedRouter::new(RouteMode::Bluetooth);
        router.set_route(RouteMode::Speaker).unwrap();
        router.set_route(RouteMode::Bluetooth).unwrap();

        assert_eq!(router.history(), vec![RouteMode::Speaker, RouteMode::Bluetooth]);

        router.reject_changes(true);
        assert!(router.set_route(RouteMode::Speaker).is_err());
        assert_eq!(router.current(), RouteMode::Bluetooth);
    }
}
