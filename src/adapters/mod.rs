//! Adapter interfaces for the host platform.
//!
//! The platform's audio recorder and call-audio routing are reached through
//! these traits. The crate ships a simulated implementation of each
//! ([`simulated`]), used by the replay command and the tests.

pub mod simulated;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CaptureSource, EncoderSettings};

pub use simulated::{SimulatedBackend, SimulatedRouter};

/// Errors reported by a capture backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("capture source {capture} rejected: {reason}")]
    Rejected {
        capture: CaptureSource,
        reason: String,
    },

    #[error("prepare failed: {0}")]
    Prepare(String),

    #[error("start failed: {0}")]
    Start(String),

    #[error("finalize failed: {0}")]
    Finalize(String),
}

/// Everything a backend needs to configure one capture attempt
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub source: CaptureSource,
    pub encoder: EncoderSettings,

    /// Run the capture under a microphone-typed foreground execution
    pub typed_foreground: bool,
}

/// Platform audio recorder
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Permissions the process still lacks for capture and storage
    async fn missing_permissions(&self) -> Vec<String>;

    /// Try to configure a capture from `request.source`.
    ///
    /// Policy or hardware may refuse any source; that is reported as
    /// [`BackendError::Rejected`].
    async fn configure(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>, BackendError>;
}

/// A configured capture, driven through prepare → start → finalize
#[async_trait]
pub trait CaptureStream: Send + Sync {
    fn source(&self) -> CaptureSource;

    /// Bind the capture to its output file
    async fn prepare(&mut self, output: &Path) -> Result<(), BackendError>;

    async fn start(&mut self) -> Result<(), BackendError>;

    /// Flush and close the output. Called even if the stream never started.
    async fn finalize(&mut self) -> Result<(), BackendError>;
}

/// Audio output route of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    Earpiece,
    Speaker,
    WiredHeadset,
    Bluetooth,
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Earpiece => "earpiece",
            Self::Speaker => "speaker",
            Self::WiredHeadset => "wired_headset",
            Self::Bluetooth => "bluetooth",
        };
        f.write_str(name)
    }
}

/// Errors from the platform audio router
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("audio routing unavailable: {0}")]
    Unavailable(String),

    #[error("route {mode} rejected: {reason}")]
    Rejected { mode: RouteMode, reason: String },
}

/// Platform call-audio routing
pub trait AudioRouter: Send {
    fn route(&self) -> Result<RouteMode, RouteError>;

    fn set_route(&mut self, mode: RouteMode) -> Result<(), RouteError>;
}
