//! Configuration for callrec.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CALLREC_HOME, CALLREC_RECORDINGS)
//! 2. Config file (.callrec/config.yaml)
//! 3. Defaults (~/.callrec, ~/.callrec/recordings)
//!
//! Config file discovery:
//! - Searches current directory and parents for .callrec/config.yaml
//! - `paths.home` is relative to the .callrec/ directory
//! - `paths.recordings` is relative to the project root (parent of .callrec/)

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{Capabilities, LifecycleSettings, RecorderSettings, DEFAULT_GRACE_PERIOD};
use crate::domain::{CaptureSource, Container, EncoderSettings};
use crate::ingest::DialerMatcher;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub lifecycle: Option<LifecycleConfig>,
    #[serde(default)]
    pub dialers: Option<DialersConfig>,
    #[serde(default)]
    pub recorder: Option<RecorderConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .callrec/)
    pub home: Option<String>,
    /// Recordings directory (relative to the project root)
    pub recordings: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    pub grace_period_ms: Option<u64>,
    pub auto_record: Option<bool>,
    pub force_speaker: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialersConfig {
    #[serde(default)]
    pub extra_packages: Vec<String>,
    #[serde(default)]
    pub fallback_substrings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    pub sources: Option<Vec<CaptureSource>>,
    pub container: Option<Container>,
    pub bitrate_bps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u16>,
    pub call_path_capture: Option<bool>,
    pub typed_foreground: Option<bool>,
}

/// Environment overrides
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub recordings: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var("CALLREC_HOME").ok().map(PathBuf::from),
            recordings: std::env::var("CALLREC_RECORDINGS").ok().map(PathBuf::from),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (journal)
    pub home: PathBuf,
    /// Where recordings are written
    pub recordings: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub lifecycle: LifecycleSettings,
    pub extra_dialers: Vec<String>,
    pub fallback_substrings: Vec<String>,
    /// Capture negotiation order
    pub sources: Vec<CaptureSource>,
    pub encoder: EncoderSettings,
    pub capabilities: Capabilities,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            recordings: home.join("recordings"),
            home,
            config_file: None,
            lifecycle: LifecycleSettings::default(),
            extra_dialers: Vec::new(),
            fallback_substrings: Vec::new(),
            sources: CaptureSource::DEFAULT_ORDER.to_vec(),
            encoder: EncoderSettings::default(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            recordings_dir: self.recordings.clone(),
            sources: self.sources.clone(),
            encoder: self.encoder.clone(),
        }
    }

    pub fn dialer_matcher(&self) -> DialerMatcher {
        DialerMatcher::new(&self.extra_dialers, &self.fallback_substrings)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.home.join("journal.jsonl")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".callrec").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed config file, env overrides and defaults
pub fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env: &EnvOverrides,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let Some((config_path, config)) = file else {
        let home = env.home.clone().unwrap_or(default_home);
        let mut resolved = ResolvedConfig::with_home(home);
        if let Some(ref recordings) = env.recordings {
            resolved.recordings = recordings.clone();
        }
        return Ok(resolved);
    };

    // .callrec/ and the project root around it
    let callrec_dir = config_path.parent().unwrap_or(Path::new("."));
    let base_dir = callrec_dir.parent().unwrap_or(Path::new("."));

    let home = if let Some(ref env_home) = env.home {
        env_home.clone()
    } else if let Some(ref home_path) = config.paths.home {
        resolve_path(callrec_dir, home_path)
    } else {
        default_home
    };

    let mut resolved = ResolvedConfig::with_home(home);
    resolved.config_file = Some(config_path.to_path_buf());

    resolved.recordings = if let Some(ref env_rec) = env.recordings {
        env_rec.clone()
    } else if let Some(ref rec_path) = config.paths.recordings {
        resolve_path(base_dir, rec_path)
    } else {
        resolved.home.join("recordings")
    };

    if let Some(lifecycle) = config.lifecycle {
        let grace_ms = lifecycle
            .grace_period_ms
            .unwrap_or(DEFAULT_GRACE_PERIOD.as_millis() as u64);
        if grace_ms == 0 {
            anyhow::bail!("lifecycle.grace_period_ms must be greater than zero");
        }
        resolved.lifecycle = LifecycleSettings {
            grace_period: Duration::from_millis(grace_ms),
            auto_record: lifecycle.auto_record.unwrap_or(true),
            force_speaker: lifecycle.force_speaker.unwrap_or(true),
        };
    }

    if let Some(dialers) = config.dialers {
        resolved.extra_dialers = dialers.extra_packages;
        resolved.fallback_substrings = dialers.fallback_substrings;
    }

    if let Some(recorder) = config.recorder {
        if let Some(sources) = recorder.sources {
            let mut ordered: Vec<CaptureSource> = Vec::with_capacity(sources.len());
            for source in sources {
                if !ordered.contains(&source) {
                    ordered.push(source);
                }
            }
            if ordered.is_empty() {
                anyhow::bail!("recorder.sources must name at least one capture source");
            }
            resolved.sources = ordered;
        }

        let defaults = EncoderSettings::default();
        resolved.encoder = EncoderSettings {
            container: recorder.container.unwrap_or(defaults.container),
            bitrate_bps: recorder.bitrate_bps.unwrap_or(defaults.bitrate_bps),
            sample_rate_hz: recorder.sample_rate_hz.unwrap_or(defaults.sample_rate_hz),
            channels: recorder.channels.unwrap_or(defaults.channels),
        };

        let caps = Capabilities::default();
        resolved.capabilities = Capabilities {
            call_path_capture: recorder.call_path_capture.unwrap_or(caps.call_path_capture),
            typed_foreground: recorder.typed_foreground.unwrap_or(caps.typed_foreground),
        };
    }

    Ok(resolved)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".callrec");

    let env = EnvOverrides::from_env();

    match find_config_file() {
        Some(config_path) => {
            let config = load_config_file(&config_path)?;
            resolve(Some((config_path.as_path(), config)), &env, default_home)
        }
        None => resolve(None, &env, default_home),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the recordings directory.
pub fn recordings_dir() -> Result<PathBuf> {
    Ok(config()?.recordings.clone())
}

/// Get the journal path ($CALLREC_HOME/journal.jsonl)
pub fn journal_path() -> Result<PathBuf> {
    Ok(config()?.journal_path())
}
