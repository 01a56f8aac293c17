//! # Equipment Interface
//!
//! This module defines the interface structures exchanged with the vehicle and with the detector
//! server.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod detect;
pub mod drone;
pub mod telem;
