//! # PWM equipment back-end
//!
//! Drivetrain and latch on a PCA9685 16 channel PWM board. The steering servo takes a standard
//! servo pulse, the drive motor is an H-bridge with one PWM enable input and two direction
//! inputs, and the electromagnet coil is switched by a PWM driven MOSFET.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{cell::RefCell, rc::Rc};
use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Address, Channel, Pca9685};
use serde::{Deserialize, Serialize};

use super::{DriveHw, EqptError, LatchHw};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: u16 = 4096;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A board providing independent PWM channels.
pub trait PwmBoard {
    /// Set the duty cycle of a channel, between 0.0 and 1.0.
    fn set_duty_cycle(&mut self, channel: u8, duty_cycle: f64) -> Result<(), EqptError>;

    /// Drive a channel permanently high.
    fn set_full_on(&mut self, channel: u8) -> Result<(), EqptError>;

    /// Drive a channel permanently low.
    fn set_full_off(&mut self, channel: u8) -> Result<(), EqptError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Calibration and wiring of the PWM back-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwmParams {
    /// I2C bus number the board is on
    pub i2c_bus: u8,

    /// I2C address of the board
    pub address: u8,

    /// Prescale value of the board's oscillator, 121 gives 50 Hz
    pub prescale: u8,

    /// PWM period.
    ///
    /// Units: microseconds
    pub period_us: f64,

    pub steer_channel: u8,

    /// Servo angle at which the vehicle drives straight.
    ///
    /// Units: degrees
    pub steer_neutral_deg: f64,

    /// Full travel of the steering servo.
    ///
    /// Units: degrees
    pub servo_range_deg: f64,

    /// Servo pulse at zero degrees.
    ///
    /// Units: microseconds
    pub servo_min_pulse_us: f64,

    /// Servo pulse at full travel.
    ///
    /// Units: microseconds
    pub servo_max_pulse_us: f64,

    /// H-bridge enable (speed) channel
    pub throttle_channel: u8,

    /// H-bridge direction input driven high for forward motion
    pub dir_fwd_channel: u8,

    /// H-bridge direction input driven high for reverse motion
    pub dir_rev_channel: u8,

    /// Electromagnet coil channel
    pub latch_channel: u8,
}

/// Drivetrain on a PWM board.
pub struct PwmDrive<B: PwmBoard> {
    board: Rc<RefCell<B>>,
    params: PwmParams,
}

/// Electromagnet on a PWM board.
pub struct PwmLatch<B: PwmBoard> {
    board: Rc<RefCell<B>>,
    channel: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<B: PwmBoard> PwmDrive<B> {
    pub fn new(board: Rc<RefCell<B>>, params: PwmParams) -> Self {
        Self { board, params }
    }

    /// Duty cycle of the servo pulse for the given steering angle relative to neutral.
    fn servo_duty(&self, angle_deg: f64) -> f64 {
        let p = &self.params;
        let servo_deg = (p.steer_neutral_deg + angle_deg).max(0.0).min(p.servo_range_deg);
        let pulse_us = p.servo_min_pulse_us 
            + (servo_deg / p.servo_range_deg) * (p.servo_max_pulse_us - p.servo_min_pulse_us);

        pulse_us / p.period_us
    }
}

impl<B: PwmBoard> DriveHw for PwmDrive<B> {
    fn set_steering_deg(&mut self, angle_deg: f64) -> Result<(), EqptError> {
        let duty = self.servo_duty(angle_deg);
        self.board.borrow_mut().set_duty_cycle(self.params.steer_channel, duty)
    }

    fn set_throttle(&mut self, fraction: f64) -> Result<(), EqptError> {
        let p = &self.params;
        let mut board = self.board.borrow_mut();

        if fraction == 0.0 {
            // Both direction inputs high with the bridge enabled shorts the motor (brake)
            board.set_full_on(p.dir_fwd_channel)?;
            board.set_full_on(p.dir_rev_channel)?;
            return board.set_full_on(p.throttle_channel)
        }

        let (high, low) = if fraction > 0.0 {
            (p.dir_fwd_channel, p.dir_rev_channel)
        }
        else {
            (p.dir_rev_channel, p.dir_fwd_channel)
        };

        board.set_full_off(low)?;
        board.set_full_on(high)?;
        board.set_duty_cycle(p.throttle_channel, fraction.abs().min(1.0))
    }
}

impl<B: PwmBoard> PwmLatch<B> {
    pub fn new(board: Rc<RefCell<B>>, channel: u8) -> Self {
        Self { board, channel }
    }
}

impl<B: PwmBoard> LatchHw for PwmLatch<B> {
    fn set_duty(&mut self, duty: f64) -> Result<(), EqptError> {
        let mut board = self.board.borrow_mut();
        match duty {
            d if d <= 0.0 => board.set_full_off(self.channel),
            d if d >= 1.0 => board.set_full_on(self.channel),
            d => board.set_duty_cycle(self.channel, d)
        }
    }
}

impl<I2C, E> PwmBoard for Pca9685<I2C>
where 
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    fn set_duty_cycle(
        &mut self, 
        channel: u8, 
        duty_cycle: f64
    ) -> Result<(), EqptError> {

        // If the duty cycle is out of range return an error
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(EqptError::InvalidDutyCycle(duty_cycle))
        }

        let off = ((duty_cycle * (MAX_PWM as f64)) as u16).min(MAX_PWM - 1);

        match self.set_channel_on_off(to_channel(channel)?, 0, off) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(EqptError::I2c),
            Err(_) => Err(EqptError::InvalidDutyCycle(duty_cycle))
        }
    }

    fn set_full_on(&mut self, channel: u8) -> Result<(), EqptError> {
        self.set_channel_full_on(to_channel(channel)?, 0)
            .map_err(|_| EqptError::I2c)
    }

    fn set_full_off(&mut self, channel: u8) -> Result<(), EqptError> {
        self.set_channel_full_off(to_channel(channel)?)
            .map_err(|_| EqptError::I2c)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open and configure a PCA9685 board on the given I2C bus.
pub fn open_pca9685<I2C, E>(i2c: I2C, params: &PwmParams) -> Result<Pca9685<I2C>, EqptError> 
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    let mut board = Pca9685::new(i2c, Address::from(params.address))
        .map_err(|_| EqptError::InitFailed(
            format!("invalid PCA9685 address {:#x}", params.address)
        ))?;

    board.set_prescale(params.prescale)
        .map_err(|_| EqptError::InitFailed("could not set prescale".into()))?;
    board.enable()
        .map_err(|_| EqptError::InitFailed("could not enable board".into()))?;

    Ok(board)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn to_channel(channel: u8) -> Result<Channel, EqptError> {
    Ok(match channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        c => return Err(EqptError::InvalidChannel(c))
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
