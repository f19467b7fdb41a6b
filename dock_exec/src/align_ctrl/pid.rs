//! # PID controller
//!
//! Time-aware PID loop used by the alignment controller. The time base is supplied by the
//! caller (the frame timestamps), so that behaviour is reproducible from recorded observations.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::params::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Previous time that the error was passed in
    prev_time_s: Option<f64>,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(gains: &PidGains) -> Self {
        Self {
            k_p: gains.k_p,
            k_i: gains.k_i,
            k_d: gains.k_d,
            integral: 0f64,
            prev_time_s: None,
            prev_error: None
        }
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_time_s = None;
        self.prev_error = None;
    }

    /// The current integral accumulation
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Get the value of the controller for the given error at the given time.
    ///
    /// The error is `setpoint - measurement`.
    pub fn get(&mut self, error: f64, time_s: f64) -> f64 {
        // Calculate dt, ignoring non-increasing timestamps
        let dt = match self.prev_time_s {
            Some(t0) if time_s > t0 => Some(time_s - t0),
            _ => None
        };

        // Accumulate the integral term.
        //
        // If there's no time difference then we don't accumulate the integral
        // The other option is to add on the error and that will produce a 
        // large spike in integral compared to normal operation, so we don't do
        // this.
        self.integral += match dt {
            Some(t) => error * t,
            None => 0f64
        };

        // Calculate the derivative.
        //
        // If there's no time difference or no previous error we assume no
        // derivative, for the same reasons as for integral.
        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64
        };

        // Calculate the output
        let out = 
            self.k_p * error 
            + self.k_i * self.integral 
            + self.k_d * deriv;
        
        // Remember the previous error and time
        self.prev_error = Some(error);
        self.prev_time_s = Some(time_s);

        out
    }
}
