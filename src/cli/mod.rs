//! Command-line interface for callrec.
//!
//! Provides commands for replaying captured event traces against the call
//! coordinator, inspecting how traces normalize, and browsing recordings and
//! the session journal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{RouteMode, SimulatedBackend, SimulatedRouter};
use crate::config;
use crate::core::{
    AudioRouteController, Coordinator, JournalSender, JournalWriter, RecordingEngine,
    SessionJournal,
};
use crate::domain::Container;
use crate::ingest::{normalize_trace, read_trace, replay, CallContext, SignalNormalizer};
use crate::library::list_recordings;

/// callrec - Call lifecycle detection and recording coordinator
#[derive(Parser, Debug)]
#[command(name = "callrec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay an event trace against the coordinator with simulated audio
    Replay {
        /// Trace file (JSONL, one {"at_ms", "event"} per line)
        trace: PathBuf,

        /// How long to keep running after the last event
        #[arg(long, default_value = "3000")]
        settle_ms: u64,

        /// Audio route in effect before the call
        #[arg(long, value_enum, default_value = "earpiece")]
        initial_route: RouteArg,

        /// Do not write the session journal
        #[arg(long)]
        no_journal: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the signals a trace normalizes to
    Normalize {
        /// Trace file
        trace: PathBuf,

        /// Print one JSON signal per line
        #[arg(long)]
        json: bool,
    },

    /// List recordings, newest first
    Recordings {
        /// Maximum number of recordings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List call sessions from the journal, newest first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Audio route for CLI (maps to RouteMode)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RouteArg {
    Earpiece,
    Speaker,
    WiredHeadset,
    Bluetooth,
}

impl From<RouteArg> for RouteMode {
    fn from(r: RouteArg) -> Self {
        match r {
            RouteArg::Earpiece => RouteMode::Earpiece,
            RouteArg::Speaker => RouteMode::Speaker,
            RouteArg::WiredHeadset => RouteMode::WiredHeadset,
            RouteArg::Bluetooth => RouteMode::Bluetooth,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Replay {
                trace,
                settle_ms,
                initial_route,
                no_journal,
                json,
            } => replay_trace(trace, settle_ms, initial_route.into(), no_journal, json).await,
            Commands::Normalize { trace, json } => show_signals(trace, json).await,
            Commands::Recordings { limit } => show_recordings(limit),
            Commands::Sessions { limit } => show_sessions(limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Replay a trace with the simulated backend and router
async fn replay_trace(
    path: PathBuf,
    settle_ms: u64,
    initial_route: RouteMode,
    no_journal: bool,
    json: bool,
) -> Result<()> {
    let cfg = config::config()?;
    let trace = read_trace(&path).await?;

    // The simulated backend only writes WAV
    let mut recorder = cfg.recorder_settings();
    recorder.encoder.container = Container::Wav;

    let backend = SimulatedBackend::new();
    let engine = RecordingEngine::new(Arc::new(backend.clone()), recorder, cfg.capabilities);

    let router = SimulatedRouter::new(initial_route);
    let route = AudioRouteController::new(Box::new(router.clone()));

    let (journal, journal_task) = if no_journal {
        (JournalSender::disabled(), None)
    } else {
        let (sender, task) = JournalWriter::spawn(SessionJournal::new(cfg.journal_path()));
        (sender, Some(task))
    };

    let (handle, task) = Coordinator::spawn(cfg.lifecycle.clone(), engine, route, journal);
    let context = CallContext::new(SignalNormalizer::new(cfg.dialer_matcher()), handle.clone());

    let outcome = replay(&context, &trace, Duration::from_millis(settle_ms)).await?;

    handle.shutdown().await?;
    task.await.context("Coordinator task failed")?;
    if let Some(journal_task) = journal_task {
        journal_task.await.context("Journal writer failed")?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("Replayed {} event(s) → {} signal(s)", outcome.events, outcome.signals);
    println!();
    println!("Sessions completed: {}", outcome.status.sessions_completed);
    println!("State after settle: {}", outcome.status.state.as_str());
    println!("Recording:          {}", if outcome.status.is_recording { "yes" } else { "no" });
    println!();

    let attempts: Vec<String> = backend.attempts().iter().map(|s| s.to_string()).collect();
    println!("Capture sources tried: {}", if attempts.is_empty() { "(none)".to_string() } else { attempts.join(", ") });

    let routes: Vec<String> = router.history().iter().map(|r| r.to_string()).collect();
    println!(
        "Route changes:         {} (final: {})",
        if routes.is_empty() { "(none)".to_string() } else { routes.join(" → ") },
        router.current()
    );

    Ok(())
}

/// Print normalized signals for a trace
async fn show_signals(path: PathBuf, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let trace = read_trace(&path).await?;

    let mut normalizer = SignalNormalizer::new(cfg.dialer_matcher());
    let signals = normalize_trace(&mut normalizer, &trace);

    if signals.is_empty() {
        println!("No signals");
        return Ok(());
    }

    if !json {
        println!("{:>8}  {:<14} {:<14} {:<17} {}", "AT (ms)", "KIND", "SOURCE", "CAUSE", "PACKAGE");
        println!("{}", "-".repeat(80));
    }

    for (at_ms, signal) in signals {
        if json {
            println!("{}", serde_json::to_string(&signal)?);
        } else {
            println!(
                "{:>8}  {:<14} {:<14} {:<17} {}",
                at_ms,
                format!("{:?}", signal.kind).to_lowercase(),
                format!("{:?}", signal.source).to_lowercase(),
                format!("{:?}", signal.cause),
                signal.origin_package
            );
        }
    }

    Ok(())
}

/// List recordings
fn show_recordings(limit: usize) -> Result<()> {
    let dir = config::recordings_dir()?;
    let recordings = list_recordings(&dir)?;

    if recordings.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }

    println!("{:<36} {:>12}  {}", "NAME", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(70));

    for recording in recordings.iter().take(limit) {
        let marker = if recording.is_empty() { "  (empty)" } else { "" };
        println!(
            "{:<36} {:>12}  {}{}",
            recording.name,
            recording.size_bytes,
            recording.modified.format("%Y-%m-%d %H:%M:%S"),
            marker
        );
    }

    if recordings.len() > limit {
        println!("... and {} more", recordings.len() - limit);
    }

    Ok(())
}

/// List sessions from the journal
async fn show_sessions(limit: usize) -> Result<()> {
    let journal = SessionJournal::open_default()?;
    let sessions = journal.sessions().await?;

    if sessions.is_empty() {
        println!("No sessions in {}", journal.path().display());
        return Ok(());
    }

    println!(
        "{:<10} {:<8} {:<20} {:<10} {:<10} {}",
        "RUN", "SESSION", "STARTED", "RECORDED", "ROUTE", "FILE"
    );
    println!("{}", "-".repeat(100));

    for session in sessions.iter().rev().take(limit) {
        let route = match (session.route_forced, session.route_restored) {
            (false, _) => "natural",
            (true, true) => "restored",
            (true, false) => "forced",
        };
        let file = session
            .recording
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());

        let run = session.run_id.simple().to_string();
        println!(
            "{:<10} {:<8} {:<20} {:<10} {:<10} {}",
            &run[..8],
            session.session_id,
            session.started_at.format("%Y-%m-%d %H:%M:%S"),
            if session.recorded { "yes" } else { "no" },
            route,
            file
        );
        for problem in &session.problems {
            println!("{:>20}⚠ {}", "", problem);
        }
        if !session.is_finished() {
            println!("{:>20}(no end recorded)", "");
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("callrec configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Recordings: {}", cfg.recordings.display());
    println!("  Journal:    {}", cfg.journal_path().display());
    println!();
    println!("Lifecycle:");
    println!("  Grace period:  {} ms", cfg.lifecycle.grace_period.as_millis());
    println!("  Auto record:   {}", cfg.lifecycle.auto_record);
    println!("  Force speaker: {}", cfg.lifecycle.force_speaker);
    println!();
    println!("Recorder:");
    let sources: Vec<&str> = cfg.sources.iter().map(|s| s.as_str()).collect();
    println!("  Sources:           {}", sources.join(" → "));
    println!(
        "  Encoding:          {} {} bps, {} Hz, {} ch",
        cfg.encoder.container.extension(),
        cfg.encoder.bitrate_bps,
        cfg.encoder.sample_rate_hz,
        cfg.encoder.channels
    );
    println!("  Call-path capture: {}", cfg.capabilities.call_path_capture);
    println!("  Typed foreground:  {}", cfg.capabilities.typed_foreground);
    println!();
    println!("Extra dialer packages:");
    if cfg.extra_dialers.is_empty() {
        println!("  (using defaults)");
    } else {
        for package in &cfg.extra_dialers {
            println!("  {}", package);
        }
    }

    Ok(())
}
