//! # Navigation library.
//!
//! This library allows other crates in the workspace to access items defined inside the
//! navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Detector client - sends frames to the object detector and receives the boxes found
pub mod detect_client;

/// Frame client - captures still frames from the vehicle's video stream
pub mod frame_client;

/// Mission module - runs missions and manages their lifecycle
pub mod mission;

/// Navigation control - PID units, detection geometry and the navigation policies
pub mod nav_ctrl;

/// Orchestrator client - message link to the mission orchestrator
pub mod orch_client;

/// Parameters of the navigation executable
pub mod params;

/// Telemetry store - the latest vehicle state
pub mod telem_store;

/// Vehicle client - command and telemetry link to the vehicle
pub mod vehicle_client;
