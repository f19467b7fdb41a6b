//! # Docking library.
//!
//! This library allows other crates in the workspace to access items defined inside the docking
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Alignment control module - turns marker observations into steering and throttle demands
pub mod align_ctrl;

/// Command channel - receives commands from dispatch and uploads session outcomes
pub mod cmd_channel;

/// Docking manager - the docking state machine
pub mod dock_mgr;

/// Equipment - drivetrain and latch drivers
pub mod eqpt;

/// Single-slot mailbox shared between tasks
pub mod mailbox;

/// Observation client - receives fiducial frames from the observation feed
pub mod obs_client;

/// Executable parameters
pub mod params;

/// Sensor gateway - receives telemetry from the module's sensor controller
pub mod sensor_gateway;

/// Video capture - records docking attempts
pub mod video;
