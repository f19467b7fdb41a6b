//! Docking manager parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the docking sequence
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DockMgrParams {
    /// Throttle magnitude of the open-loop reverse onto the dock
    pub reverse_throttle: f64,

    /// Proximity reading at or below which the vehicle counts as in contact.
    ///
    /// Units: centimetres
    pub proximity_threshold_cm: f64,

    /// Maximum time spent reversing before the attempt fails.
    ///
    /// Units: seconds
    pub reverse_timeout_s: f64,

    /// Forward throttle of the creep once docked
    pub docked_creep_throttle: f64,

    /// Duration of the creep once docked.
    ///
    /// Units: seconds
    pub docked_creep_s: f64,

    /// Time stopped before the latch is released.
    ///
    /// Units: seconds
    pub latch_hold_s: f64,

    /// Marker of the return dock, used by return commands which do not name a target
    pub return_marker_id: u32,

    /// Physical module tag to marker id
    #[serde(default)]
    pub fixtures: HashMap<String, u32>,
}

// ---------------------------------------------------------------------------
// TEST PARAMETERS
// ---------------------------------------------------------------------------

/// The tuned parameter set from `params/dock_mgr.toml`, with a short reverse timeout.
#[cfg(test)]
pub(crate) fn test_params() -> DockMgrParams {
    let mut fixtures = HashMap::new();
    fixtures.insert("043F926A6C1D90".to_string(), 1);
    fixtures.insert("043F8E6A6C1D90".to_string(), 2);

    DockMgrParams {
        reverse_throttle: 0.4,
        proximity_threshold_cm: 10.0,
        reverse_timeout_s: 5.0,
        docked_creep_throttle: 0.4,
        docked_creep_s: 1.5,
        latch_hold_s: 1.0,
        return_marker_id: 11,
        fixtures,
    }
}
