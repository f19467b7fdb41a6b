//! Alignment control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains of a single PID loop
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
}

/// Parameters for alignment control.
///
/// The gains and thresholds are empirically tuned for one camera and drivetrain and must be
/// recalibrated for different optics or hardware.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AlignCtrlParams {

    // ---- CONTROLLERS ----

    /// Lateral error controller gains
    pub lat_gains: PidGains,

    /// Rotation error controller gains
    pub rot_gains: PidGains,

    /// Size error controller gains
    pub size_gains: PidGains,

    /// Weight of the lateral correction in the steering demand
    pub lat_blend: f64,

    /// Weight of the rotation correction in the steering demand
    pub rot_blend: f64,

    // ---- MARKER GEOMETRY ----

    /// The size proxy (product of two adjacent edge lengths) of the marker when the vehicle is at
    /// the docking start position.
    ///
    /// Units: pixels^2
    pub target_size_px2: f64,

    /// Scale applied to the raw skew angle computed from the marker's vertical edges.
    pub rotation_scale: f64,

    /// Absolute limit of the rotation estimate.
    ///
    /// Units: degrees
    pub rotation_limit_deg: f64,

    // ---- ALIGNMENT THRESHOLDS ----

    /// Alignment requires the absolute lateral error to be below this value.
    ///
    /// Units: pixels
    pub lat_threshold_px: f64,

    /// Alignment requires the absolute rotation to be below this value.
    ///
    /// Units: degrees
    pub rot_threshold_deg: f64,

    /// Alignment requires the size error to be below this fraction of the target size.
    pub size_tolerance_frac: f64,

    // ---- DEMAND LIMITS ----

    /// Minimum throttle magnitude while tracking the marker
    pub min_throttle: f64,

    /// Maximum throttle magnitude while tracking the marker
    pub max_throttle: f64,

    /// Absolute steering demand limit relative to neutral.
    ///
    /// Units: degrees
    pub max_steer_deg: f64,

    // ---- LOST MARKER POLICY ----

    /// Time for which the previous throttle is held after the marker is lost.
    ///
    /// Units: seconds
    pub lost_grace_s: f64,

    /// Constant forward throttle used to search for the marker after the grace period.
    pub search_throttle: f64,
}

// ---------------------------------------------------------------------------
// TEST PARAMETERS
// ---------------------------------------------------------------------------

/// The tuned parameter set from `params/align_ctrl.toml`, for tests.
#[cfg(test)]
pub(crate) fn test_params() -> AlignCtrlParams {
    AlignCtrlParams {
        lat_gains: PidGains { k_p: 0.06, k_i: 0.013, k_d: 0.004 },
        rot_gains: PidGains { k_p: 0.055, k_i: 0.011, k_d: 0.0035 },
        size_gains: PidGains { k_p: 0.022, k_i: 0.007, k_d: 0.0018 },
        lat_blend: 0.7,
        rot_blend: 0.3,
        target_size_px2: 8000.0,
        rotation_scale: 2.0,
        rotation_limit_deg: 90.0,
        lat_threshold_px: 13.0,
        rot_threshold_deg: 3.0,
        size_tolerance_frac: 0.1,
        min_throttle: 0.2,
        max_throttle: 0.4,
        max_steer_deg: 20.0,
        lost_grace_s: 1.0,
        search_throttle: 0.3,
    }
}
