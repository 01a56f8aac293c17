//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Messages exchanged with the mission orchestrator
pub mod orch;

/// Command and data definitions for equipment (the vehicle and the detector)
pub mod eqpt;

/// Network module
pub mod net;
