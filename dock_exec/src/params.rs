//! # Docking Executable Parameters
//!
//! This module provide parameters for the docking executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use crate::eqpt::{ActuatorParams, EqptBackend, LatchParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DockExecParams {

    /// Network endpoint of the dispatch command server
    pub dispatch_endpoint: String,

    /// Identity this vehicle presents to dispatch
    pub client_id: String,

    /// Network endpoint of the fiducial observation feed
    pub fiducial_endpoint: String,

    /// Address the sensor gateway listens on for the module's sensor controller
    pub sensor_listen_addr: String,

    /// Maximum time to wait for the next camera frame before it counts as a read failure.
    ///
    /// Units: milliseconds
    pub frame_timeout_ms: i32,

    /// Minimum interval between dispatch reconnection attempts.
    ///
    /// Units: milliseconds
    pub reconnect_ivl_ms: i32,

    /// Maximum interval between dispatch reconnection attempts, the interval doubles up to
    /// this value.
    ///
    /// Units: milliseconds
    pub reconnect_ivl_max_ms: i32,

    /// Number of outbound artifacts that can be queued for dispatch
    pub outbound_queue_depth: usize,

    /// JPEG quality used when frames must be transcoded for recording
    pub video_jpeg_quality: u8,

    /// Equipment back-end
    pub eqpt: EqptBackend,

    /// Actuator limits
    pub actuator: ActuatorParams,

    /// Latch drive parameters
    pub latch: LatchParams,
}

// ------------------------------------------------------------------------------------------------
// TEST PARAMETERS
// ------------------------------------------------------------------------------------------------

/// Parameters with unroutable endpoints and the simulated back-end, for tests.
#[cfg(test)]
pub(crate) fn test_params() -> DockExecParams {
    DockExecParams {
        dispatch_endpoint: "tcp://127.0.0.1:1".into(),
        client_id: "vehicle-test".into(),
        fiducial_endpoint: "tcp://127.0.0.1:1".into(),
        sensor_listen_addr: "127.0.0.1:0".into(),
        frame_timeout_ms: 100,
        reconnect_ivl_ms: 50,
        reconnect_ivl_max_ms: 500,
        outbound_queue_depth: 4,
        video_jpeg_quality: 80,
        eqpt: EqptBackend::Sim,
        actuator: ActuatorParams { max_steer_deg: 20.0, max_throttle: 1.0 },
        latch: LatchParams { 
            energize_duty: 1.0, 
            release_pulse_duty: 0.1, 
            release_pulse_s: 0.1 
        },
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
