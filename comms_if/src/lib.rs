//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the docking software: the messages
//! exchanged with dispatch, the sensor controller and the fiducial observation feed.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Dispatch (rental backend) command and artifact messages
pub mod dispatch;

/// Data definitions for equipment (sensor controller, fiducial feed)
pub mod eqpt;

/// Network module
pub mod net;
