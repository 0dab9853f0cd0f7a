//! Recording job and capture configuration types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audio capture source, in the vocabulary of the platform recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Both sides of the call, straight from the call path
    VoiceCall,

    /// Microphone tuned for VoIP/communication
    VoiceCommunication,

    /// Generic microphone
    Mic,

    /// Microphone tuned for speech recognition
    VoiceRecognition,

    /// Microphone tuned for video recording
    Camcorder,
}

impl CaptureSource {
    /// Default negotiation order, highest fidelity first
    pub const DEFAULT_ORDER: [CaptureSource; 5] = [
        CaptureSource::VoiceCall,
        CaptureSource::VoiceCommunication,
        CaptureSource::Mic,
        CaptureSource::VoiceRecognition,
        CaptureSource::Camcorder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceCall => "voice_call",
            Self::VoiceCommunication => "voice_communication",
            Self::Mic => "mic",
            Self::VoiceRecognition => "voice_recognition",
            Self::Camcorder => "camcorder",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container/codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// AAC in an MPEG-4 container
    Mpeg4Aac,

    /// Uncompressed PCM WAV
    Wav,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mpeg4Aac => "m4a",
            Self::Wav => "wav",
        }
    }
}

/// Encoder parameters handed to the capture backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    #[serde(default = "default_container")]
    pub container: Container,

    #[serde(default = "default_bitrate")]
    pub bitrate_bps: u32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_container() -> Container {
    Container::Mpeg4Aac
}
fn default_bitrate() -> u32 {
    128_000
}
fn default_sample_rate() -> u32 {
    44_100
}
fn default_channels() -> u16 {
    1
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            container: default_container(),
            bitrate_bps: default_bitrate(),
            sample_rate_hz: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

/// Lifecycle status of a recording job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Preparing,
    Active,
    Stopped,
    Failed,
}

/// A single recording of a single call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingJob {
    pub session_id: u64,
    pub output_path: PathBuf,
    pub backend: CaptureSource,
    pub status: JobStatus,

    /// Best effort; filled in on stop
    pub bytes_written: u64,

    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl RecordingJob {
    pub fn new(session_id: u64, output_path: PathBuf, backend: CaptureSource) -> Self {
        Self {
            session_id,
            output_path,
            backend,
            status: JobStatus::Preparing,
            bytes_written: 0,
            started_at: Utc::now(),
            stopped_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }
}

/// Action requested of the recording engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
}

/// Command the coordinator issues to the recording engine.
///
/// Kept small and serializable: some deployments run the recorder in a
/// separate process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingControl {
    pub action: ControlAction,
    pub session_id: u64,
}

impl RecordingControl {
    pub fn start(session_id: u64) -> Self {
        Self {
            action: ControlAction::Start,
            session_id,
        }
    }

    pub fn stop(session_id: u64) -> Self {
        Self {
            action: ControlAction::Stop,
            session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_control_wire_format() {
        let json = serde_json::to_string(&RecordingControl::start(7)).unwrap();
        assert_eq!(json, r#"{"action":"start","session_id":7}"#);

        let parsed: RecordingControl = serde_json::from_str(r#"{"action":"stop","session_id":7}"#).unwrap();
        assert_eq!(parsed, RecordingControl::stop(7));
    }

    #[test]
    fn test_default_encoder_settings() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.container.extension(), "m4a");
        assert_eq!(settings.bitrate_bps, 128_000);
        assert_eq!(settings.sample_rate_hz, 44_100);
    }

    #[test]
    fn test_default_order_starts_with_call_path() {
        assert_eq!(CaptureSource::DEFAULT_ORDER[0], CaptureSource::VoiceCall);
        assert_eq!(CaptureSource::DEFAULT_ORDER[4], CaptureSource::Camcorder);
    }
}
