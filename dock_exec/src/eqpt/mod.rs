//! # Equipment module
//!
//! Drivetrain and electromagnet interfaces. Hardware back-ends implement [`DriveHw`] and
//! [`LatchHw`]; the [`ActuatorDriver`] and [`LatchCtrl`] wrappers clamp demands, make the latch
//! operations idempotent and swallow (logging) any hardware error so that a hardware fault never
//! propagates into the docking sequence.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod actuator;
mod latch;
pub mod pwm;
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

pub use actuator::*;
pub use latch::*;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Hardware interface of the drivetrain.
pub trait DriveHw {
    /// Set the steering angle relative to straight ahead, positive right.
    fn set_steering_deg(&mut self, angle_deg: f64) -> Result<(), EqptError>;

    /// Set the throttle fraction, positive forward. Zero must brake, not coast.
    fn set_throttle(&mut self, fraction: f64) -> Result<(), EqptError>;
}

/// Hardware interface of the docking electromagnet.
pub trait LatchHw {
    /// Set the coil drive duty cycle, between 0.0 and 1.0.
    fn set_duty(&mut self, duty: f64) -> Result<(), EqptError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A demand for the drivetrain.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Steering angle relative to straight ahead.
    ///
    /// Units: degrees
    pub steering_angle_deg: f64,

    /// Throttle fraction between -1.0 (full reverse) and 1.0 (full forward)
    pub throttle: f64,
}

/// Limits applied by the [`ActuatorDriver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorParams {
    /// Absolute steering limit.
    ///
    /// Units: degrees
    pub max_steer_deg: f64,

    /// Absolute throttle limit, at most 1.0
    pub max_throttle: f64,
}

/// Parameters of the [`LatchCtrl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatchParams {
    /// Duty cycle holding the latch energized
    pub energize_duty: f64,

    /// Duty cycle of the discharge pulse issued on release
    pub release_pulse_duty: f64,

    /// Length of the discharge pulse.
    ///
    /// Units: seconds
    pub release_pulse_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Equipment back-end selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum EqptBackend {
    /// Log demands without driving hardware
    Sim,

    /// PCA9685 PWM board over I2C
    Pca9685(pwm::PwmParams),
}

/// Errors raised by the hardware back-ends.
#[derive(Debug, thiserror::Error)]
pub enum EqptError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Duty cycle must be between 0.0 and 1.0, got {0}")]
    InvalidDutyCycle(f64),

    #[error("PWM channel {0} does not exist")]
    InvalidChannel(u8),

    #[error("Could not initialise the equipment back-end: {0}")]
    InitFailed(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlCommand {
    pub fn new(steering_angle_deg: f64, throttle: f64) -> Self {
        Self {
            steering_angle_deg,
            throttle,
        }
    }

    /// Neutral steering and zero throttle
    pub fn stop() -> Self {
        Self::default()
    }
}

impl<T: DriveHw + ?Sized> DriveHw for Box<T> {
    fn set_steering_deg(&mut self, angle_deg: f64) -> Result<(), EqptError> {
        (**self).set_steering_deg(angle_deg)
    }

    fn set_throttle(&mut self, fraction: f64) -> Result<(), EqptError> {
        (**self).set_throttle(fraction)
    }
}

impl<T: LatchHw + ?Sized> LatchHw for Box<T> {
    fn set_duty(&mut self, duty: f64) -> Result<(), EqptError> {
        (**self).set_duty(duty)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the drive and latch hardware of the selected back-end.
pub fn open_backend(
    backend: &EqptBackend
) -> Result<(Box<dyn DriveHw>, Box<dyn LatchHw>), EqptError> {
    match backend {
        EqptBackend::Sim => Ok((Box::new(sim::SimDrive), Box::new(sim::SimLatch))),
        EqptBackend::Pca9685(params) => open_pca9685_backend(params)
    }
}

#[cfg(target_os = "linux")]
fn open_pca9685_backend(
    params: &pwm::PwmParams
) -> Result<(Box<dyn DriveHw>, Box<dyn LatchHw>), EqptError> {
    use std::{cell::RefCell, rc::Rc};

    let i2c = rppal::i2c::I2c::with_bus(params.i2c_bus)
        .map_err(|e| EqptError::InitFailed(format!("could not open I2C bus: {}", e)))?;
    let board = Rc::new(RefCell::new(pwm::open_pca9685(i2c, params)?));

    Ok((
        Box::new(pwm::PwmDrive::new(board.clone(), params.clone())),
        Box::new(pwm::PwmLatch::new(board, params.latch_channel))
    ))
}

#[cfg(not(target_os = "linux"))]
fn open_pca9685_backend(
    _params: &pwm::PwmParams
) -> Result<(Box<dyn DriveHw>, Box<dyn LatchHw>), EqptError> {
    Err(EqptError::InitFailed("I2C is only available on linux hosts".into()))
}

// ------------------------------------------------------------------------------------------------
// TEST DOUBLES
// ------------------------------------------------------------------------------------------------

/// Recording hardware fakes sharing one ordered event log.
#[cfg(test)]
pub(crate) mod fake {
    use std::{cell::{Cell, RefCell}, rc::Rc};
    use super::*;

    /// Something that reached the hardware
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Event {
        Steer(f64),
        Throttle(f64),
        LatchDuty(f64),
    }

    pub type EventLog = Rc<RefCell<Vec<Event>>>;

    pub struct FakeDrive {
        pub log: EventLog,
        pub fail: bool,
    }

    pub struct FakeLatch {
        pub log: EventLog,

        /// Shared so that a test can break and repair the latch after handing it over
        pub fail: Rc<Cell<bool>>,
    }

    impl DriveHw for FakeDrive {
        fn set_steering_deg(&mut self, angle_deg: f64) -> Result<(), EqptError> {
            self.log.borrow_mut().push(Event::Steer(angle_deg));
            if self.fail { Err(EqptError::I2c) } else { Ok(()) }
        }

        fn set_throttle(&mut self, fraction: f64) -> Result<(), EqptError> {
            self.log.borrow_mut().push(Event::Throttle(fraction));
            if self.fail { Err(EqptError::I2c) } else { Ok(()) }
        }
    }

    impl LatchHw for FakeLatch {
        fn set_duty(&mut self, duty: f64) -> Result<(), EqptError> {
            self.log.borrow_mut().push(Event::LatchDuty(duty));
            if self.fail.get() { Err(EqptError::I2c) } else { Ok(()) }
        }
    }

    /// Create a drive and latch pair sharing a new log
    pub fn pair() -> (FakeDrive, FakeLatch, EventLog) {
        let log = EventLog::default();
        (
            FakeDrive { log: log.clone(), fail: false },
            FakeLatch { log: log.clone(), fail: Rc::default() },
            log
        )
    }

    pub fn actuator_params() -> ActuatorParams {
        ActuatorParams {
            max_steer_deg: 20.0,
            max_throttle: 1.0,
        }
    }

    pub fn latch_params() -> LatchParams {
        LatchParams {
            energize_duty: 1.0,
            release_pulse_duty: 0.1,
            release_pulse_s: 0.01,
        }
    }
}
