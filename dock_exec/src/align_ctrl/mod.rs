//! # Alignment control module
//!
//! Turns observations of the target fiducial marker into steering and throttle demands using
//! three PID loops: lateral offset and skew are blended into steering, apparent size drives the
//! throttle. The controller never talks to hardware, the docking manager forwards its output.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod metrics;
mod params;
mod pid;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use metrics::*;
pub use params::*;
pub use pid::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during AlignCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum AlignCtrlError {
    #[error("Frame width must be positive and finite, got {0}")]
    InvalidFrameWidth(f64),

    #[error("Observation of marker {0} is degenerate")]
    DegenerateObservation(u32),
}
