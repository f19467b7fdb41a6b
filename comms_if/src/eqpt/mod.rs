//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the equipment the
//! docking controller talks to.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod fiducial;
pub mod sensor;
