//! Actuator driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};

use super::{ActuatorParams, ControlCommand, DriveHw};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Clamping wrapper around a drivetrain back-end.
///
/// All demands are clamped to the configured limits before reaching hardware. Hardware errors are
/// logged and never returned.
pub struct ActuatorDriver<D: DriveHw> {
    hw: D,

    params: ActuatorParams,

    /// The last demand passed to the hardware, after clamping
    last_cmd: ControlCommand,

    /// Set once a steering clamp has been reported at warn level
    steer_clamp_warned: bool,

    /// Set once a throttle clamp has been reported at warn level
    throttle_clamp_warned: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<D: DriveHw> ActuatorDriver<D> {
    pub fn new(hw: D, params: ActuatorParams) -> Self {
        Self {
            hw,
            params,
            last_cmd: ControlCommand::stop(),
            steer_clamp_warned: false,
            throttle_clamp_warned: false,
        }
    }

    /// The last (clamped) command sent to the hardware
    pub fn last_cmd(&self) -> ControlCommand {
        self.last_cmd
    }

    /// Set the steering angle relative to straight ahead.
    pub fn set_steering(&mut self, angle_deg: f64) {
        let angle_deg = clamp_demand(
            "steering", 
            angle_deg, 
            self.params.max_steer_deg, 
            &mut self.steer_clamp_warned
        );

        self.last_cmd.steering_angle_deg = angle_deg;

        if let Err(e) = self.hw.set_steering_deg(angle_deg) {
            warn!("Could not set steering to {:.2} deg: {}", angle_deg, e);
        }
    }

    /// Set the throttle fraction.
    pub fn set_throttle(&mut self, fraction: f64) {
        let max = self.params.max_throttle.min(1.0);
        let fraction = clamp_demand(
            "throttle", 
            fraction, 
            max, 
            &mut self.throttle_clamp_warned
        );

        self.last_cmd.throttle = fraction;

        if let Err(e) = self.hw.set_throttle(fraction) {
            warn!("Could not set throttle to {:.2}: {}", fraction, e);
        }
    }

    /// Apply a full command, throttle first so that a stop is never delayed by steering.
    pub fn apply(&mut self, cmd: ControlCommand) {
        self.set_throttle(cmd.throttle);
        self.set_steering(cmd.steering_angle_deg);
    }

    /// Brake and centre the steering.
    pub fn stop(&mut self) {
        self.apply(ControlCommand::stop());
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Clamp a demand to `+/- limit`. Non-finite demands become zero.
fn clamp_demand(name: &str, value: f64, limit: f64, warned: &mut bool) -> f64 {
    if !value.is_finite() {
        warn!("Non-finite {} demand ({}), using 0", name, value);
        return 0.0
    }

    let clamped = value.max(-limit).min(limit);

    if clamped != value {
        if *warned {
            debug!("Clamped {} demand {:.3} to {:.3}", name, value, clamped);
        }
        else {
            warn!("Clamped {} demand {:.3} to {:.3}", name, value, clamped);
            *warned = true;
        }
    }

    clamped
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
