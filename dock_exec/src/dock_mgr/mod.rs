//! # Docking manager module
//!
//! Owns the drivetrain, the latch and at most one docking session, and steps the session's state
//! machine once per camera frame:
//!
//! ```text
//! IDLE -> SEARCHING <-> APPROACHING -> ALIGNED -> REVERSING_TO_DOCK -> DOCKED -> DEPARTING -> IDLE
//!                          any active state -> FAILED -> IDLE
//! ```
//!
//! Every failure goes through one handler which stops the drivetrain before anything else, then
//! seals the video and reports the failure to dispatch.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod session;
mod state;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;
use serde::Serialize;

pub use params::*;
pub use session::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// States of a docking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DockState {
    Idle,
    Searching,
    Approaching,
    Aligned,
    ReversingToDock,
    Docked,
    Departing,
    Failed,
}

/// Reason a session failed, reported to dispatch as a reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    /// Cancelled by dispatch
    Cancelled,

    /// The next camera frame could not be read
    CameraReadFailure,

    /// No dock tag was confirmed within the reverse timeout
    ReverseTimeout,

    /// The video capture could not be opened or sealed
    VideoCaptureError,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FailReason {
    /// Reason code sent to dispatch
    pub fn code(&self) -> &'static str {
        match self {
            FailReason::Cancelled => "CANCELLED",
            FailReason::CameraReadFailure => "CAMERA_READ_FAILURE",
            FailReason::ReverseTimeout => "REVERSE_TIMEOUT",
            FailReason::VideoCaptureError => "VIDEO_CAPTURE_ERROR",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
