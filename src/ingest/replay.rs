//! Timed event traces.
//!
//! A trace is a JSONL file with one `{"at_ms": …, "event": {…}}` object per
//! line, `at_ms` counted from the start of the trace. Blank lines and lines
//! starting with `#` are ignored.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::info;

use crate::core::CoordinatorStatus;
use crate::domain::{RawEvent, Signal};

use super::context::CallContext;
use super::normalizer::SignalNormalizer;

/// Latest offset a trace may use (one week)
pub const MAX_TRACE_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// One line of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub at_ms: u64,
    pub event: RawEvent,
}

/// Parse trace text
pub fn parse_trace(content: &str) -> Result<Vec<TraceEvent>> {
    let mut events: Vec<TraceEvent> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: TraceEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid trace event on line {}", idx + 1))?;

        if event.at_ms > MAX_TRACE_MS {
            anyhow::bail!(
                "Trace offset out of range on line {} ({} ms, limit {} ms)",
                idx + 1,
                event.at_ms,
                MAX_TRACE_MS
            );
        }
        if let Some(prev) = events.last() {
            if event.at_ms < prev.at_ms {
                anyhow::bail!(
                    "Trace goes back in time on line {} ({} ms after {} ms)",
                    idx + 1,
                    event.at_ms,
                    prev.at_ms
                );
            }
        }
        events.push(event);
    }

    Ok(events)
}

/// Read and parse a trace file
pub async fn read_trace(path: &Path) -> Result<Vec<TraceEvent>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read trace: {}", path.display()))?;
    parse_trace(&content)
}

/// Signals a trace produces, with their trace offsets
pub fn normalize_trace(normalizer: &mut SignalNormalizer, trace: &[TraceEvent]) -> Vec<(u64, Signal)> {
    let origin = Utc::now();
    trace
        .iter()
        .flat_map(|item| {
            normalizer
                .normalize(&item.event, offset(origin, item.at_ms))
                .into_iter()
                .map(move |signal| (item.at_ms, signal))
        })
        .collect()
}

/// Summary of a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub events: usize,
    pub signals: usize,
    pub status: CoordinatorStatus,
}

/// Feed `trace` through `context` in real (tokio) time, then wait `settle`
/// for timers to run out.
pub async fn replay(context: &CallContext, trace: &[TraceEvent], settle: Duration) -> Result<ReplayOutcome> {
    let start = Instant::now();
    let origin = Utc::now();
    let mut signals = 0;

    for item in trace {
        time::sleep_until(start + Duration::from_millis(item.at_ms)).await;
        signals += context
            .dispatch_at(item.event.clone(), offset(origin, item.at_ms))
            .await?;
    }

    time::sleep(settle).await;
    let status = context.coordinator().status().await?;

    info!(events = trace.len(), signals, "Replay finished");
    Ok(ReplayOutcome {
        events: trace.len(),
        signals,
        status,
    })
}

fn offset(origin: DateTime<Utc>, at_ms: u64) -> DateTime<Utc> {
    origin + chrono::Duration::milliseconds(at_ms as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalKind;

    const TRACE: &str = r#"
# outgoing call through a third-party dialer
{"at_ms": 0, "event": {"type": "ui_observation", "package_name": "com.android.dialer", "text": ["Calling"]}}
{"at_ms": 900, "event": {"type": "ui_observation", "package_name": "com.android.dialer", "text": ["0:01"]}}

{"at_ms": 5000, "event": {"type": "legacy_phone_state", "state": "idle"}}
"#;

    #[test]
    fn test_parse_trace_skips_comments() {
        let trace = parse_trace(TRACE).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[2].at_ms, 5000);
    }

    #[test]
    fn test_parse_trace_rejects_time_travel() {
        let content = r#"{"at_ms": 10, "event": {"type": "call_added", "call_id": "a"}}
{"at_ms": 5, "event": {"type": "call_removed", "call_id": "a"}}"#;

        let err = parse_trace(content).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_trace_rejects_huge_offset() {
        let content = format!(
            "{{\"at_ms\": 0, \"event\": {{\"type\": \"call_added\", \"call_id\": \"a\"}}}}\n\
             {{\"at_ms\": {}, \"event\": {{\"type\": \"call_removed\", \"call_id\": \"a\"}}}}",
            u64::MAX
        );

        let err = parse_trace(&content).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("out of range"));
        assert!(message.contains("line 2"));

        let edge = format!(
            "{{\"at_ms\": {}, \"event\": {{\"type\": \"call_added\", \"call_id\": \"a\"}}}}",
            MAX_TRACE_MS
        );
        assert_eq!(parse_trace(&edge).unwrap()[0].at_ms, MAX_TRACE_MS);
    }

    #[test]
    fn test_parse_trace_reports_bad_line() {
        let err = parse_trace("{\"at_ms\": 0}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_normalize_trace() {
        let trace = parse_trace(TRACE).unwrap();
        let mut normalizer = SignalNormalizer::default();

        let signals = normalize_trace(&mut normalizer, &trace);
        let kinds: Vec<(u64, SignalKind)> = signals.iter().map(|(at, s)| (*at, s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, SignalKind::Active),
                (900, SignalKind::Active),
                (5000, SignalKind::Ending),
            ]
        );
    }
}
