//! Docking session record

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::Serialize;

use comms_if::dispatch::{Direction, Outcome, SessionId};

use super::{DockState, FailReason};
use crate::video::{file_safe, VideoArtifact};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The archived record of one docking session.
#[derive(Debug, Clone, Serialize)]
pub struct DockingSession {
    pub session_id: SessionId,

    pub direction: Direction,

    pub target_marker_id: u32,

    /// Current (or final) state
    pub state: DockState,

    pub started_at: DateTime<Utc>,

    /// Every state entered, with the frame time of entry if one was available
    pub history: Vec<Transition>,

    /// Tag read when the dock was confirmed
    pub dock_tag_id: Option<String>,

    pub video: Option<VideoArtifact>,

    pub outcome: Option<Outcome>,

    pub fail_reason: Option<FailReason>,
}

/// One entry in the state history
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Transition {
    pub state: DockState,

    /// Units: seconds
    pub time_s: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DockingSession {
    pub fn new(session_id: SessionId, direction: Direction, target_marker_id: u32) -> Self {
        Self {
            session_id,
            direction,
            target_marker_id,
            state: DockState::Idle,
            started_at: Utc::now(),
            history: Vec::new(),
            dock_tag_id: None,
            video: None,
            outcome: None,
            fail_reason: None,
        }
    }

    /// Record entry into a new state.
    pub fn enter(&mut self, state: DockState, time_s: Option<f64>) {
        self.state = state;
        self.history.push(Transition { state, time_s });
    }

    /// Session-relative path of the archive
    pub fn archive_path(&self) -> String {
        format!("dock_sessions/{}.json", file_safe(&self.session_id.to_string()))
    }
}
