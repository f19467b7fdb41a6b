//! # Simulated equipment back-end
//!
//! Logs every demand without driving hardware, for bench runs of the docking sequence.

use log::info;

use super::{DriveHw, EqptError, LatchHw};

/// Logging drivetrain
#[derive(Default)]
pub struct SimDrive;

/// Logging electromagnet
#[derive(Default)]
pub struct SimLatch;

impl DriveHw for SimDrive {
    fn set_steering_deg(&mut self, angle_deg: f64) -> Result<(), EqptError> {
        info!(target: "sim_eqpt", "Steering -> {:.2} deg", angle_deg);
        Ok(())
    }

    fn set_throttle(&mut self, fraction: f64) -> Result<(), EqptError> {
        info!(target: "sim_eqpt", "Throttle -> {:.2}", fraction);
        Ok(())
    }
}

impl LatchHw for SimLatch {
    fn set_duty(&mut self, duty: f64) -> Result<(), EqptError> {
        info!(target: "sim_eqpt", "Latch duty -> {:.2}", duty);
        Ok(())
    }
}
