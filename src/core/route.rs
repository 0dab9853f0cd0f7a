//! Audio route controller.
//!
//! Forces call audio to the speaker (so microphone capture hears the far
//! side) and puts the previous route back afterwards. Every force is paired
//! with at most one restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::{AudioRouter, RouteError, RouteMode};

/// Whether the controller currently holds the route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Forced,
    Natural,
}

/// Route in effect before the speaker was forced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub session_id: u64,
    pub previous: RouteMode,
    pub taken_at: DateTime<Utc>,
}

pub struct AudioRouteController {
    router: Box<dyn AudioRouter>,
    snapshot: Option<RouteSnapshot>,
}

impl AudioRouteController {
    pub fn new(router: Box<dyn AudioRouter>) -> Self {
        Self {
            router,
            snapshot: None,
        }
    }

    /// Route audio to the speaker and return the route it replaced.
    ///
    /// Forcing again keeps the first snapshot, so a later restore returns to
    /// the route from before the first force.
    pub fn force_speaker(&mut self, session_id: u64) -> Result<RouteMode, RouteError> {
        if let Some(ref snapshot) = self.snapshot {
            debug!(session_id, previous = %snapshot.previous, "Speaker already forced");
            self.router.set_route(RouteMode::Speaker)?;
            return Ok(snapshot.previous);
        }

        let previous = self.router.route()?;
        self.router.set_route(RouteMode::Speaker)?;

        info!(session_id, %previous, "Speaker forced");
        self.snapshot = Some(RouteSnapshot {
            session_id,
            previous,
            taken_at: Utc::now(),
        });

        Ok(previous)
    }

    /// Put back the route captured by the first force.
    ///
    /// No-op without a snapshot. The snapshot is consumed even when the
    /// platform refuses the change.
    pub fn restore(&mut self) -> Option<RouteSnapshot> {
        let snapshot = self.snapshot.take()?;

        match self.router.set_route(snapshot.previous) {
            Ok(()) => {
                info!(session_id = snapshot.session_id, route = %snapshot.previous, "Route restored");
            }
            Err(e) => {
                warn!(session_id = snapshot.session_id, error = %e, "Failed to restore audio route");
            }
        }

        Some(snapshot)
    }

    pub fn current_route(&self) -> RouteState {
        if self.snapshot.is_some() {
            RouteState::Forced
        } else {
            RouteState::Natural
        }
    }
}
