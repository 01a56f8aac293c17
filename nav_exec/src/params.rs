//! # Navigation Executable Parameters
//!
//! This module provide parameters for the navigation executable, loaded from `nav_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::nav_ctrl::PolicyKind;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NavExecParams {
    pub vehicle: VehicleParams,

    pub mission: MissionParams,

    pub capture: CaptureParams,
}

/// Addressing of the vehicle's UDP interface
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleParams {
    /// IP address of the vehicle
    pub address: String,

    /// Port on the vehicle which accepts commands
    pub cmd_port: u16,

    /// Local port commands are sent from, the vehicle replies to this port
    pub local_cmd_port: u16,

    /// Local port the vehicle broadcasts telemetry to
    pub telem_port: u16,

    /// Local port the vehicle streams video to
    pub video_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionParams {
    /// Which navigation policy missions use
    pub policy: PolicyKind,

    /// Width of captured frames in pixels
    pub frame_width: u32,

    /// Height of captured frames in pixels
    pub frame_height: u32,

    /// Wait between the end of one cycle and the start of the next
    pub cycle_period_s: f64,

    /// Takeoff is commanded at mission start if the vehicle is below this height
    pub takeoff_height_threshold_cm: i32,

    /// Time to wait after takeoff before starting the first cycle
    pub takeoff_settle_s: f64,

    /// Telemetry older than this is treated as unknown
    pub telem_stale_s: f64,

    /// Number of consecutive failed cycles after which the mission is aborted
    pub max_consec_failed_cycles: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureParams {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,

    /// Maximum time to wait for a single frame
    pub timeout_s: f64,
}
