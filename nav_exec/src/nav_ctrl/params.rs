//! Navigation control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::pid::PidParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for navigation control
#[derive(Deserialize, Debug, Clone)]
pub struct NavCtrlParams {
    /// Horizontal (yaw) error controller
    pub yaw_pid: PidParams,

    /// Vertical error controller
    pub vert_pid: PidParams,

    /// Forward axis controller, reserved for range control
    pub fwd_pid: PidParams,

    /// Limit on the magnitude of each controller's integral accumulation
    pub integral_limit: f64,

    /// Coverage at or above which the vehicle lands on the target
    pub landing_coverage_percent: u32,

    /// Error below which an axis is considered aligned, in pixels
    pub centering_tolerance_px: f64,

    /// Minimum distance of a forward or vertical move in centimeters
    pub min_move_cm: f64,

    /// Maximum distance of a forward or vertical move in centimeters
    pub max_move_cm: f64,

    /// Forward distance per percent of uncovered frame when centred, so that
    /// `forward = (100 - coverage) * forward_gain_cm`
    pub forward_gain_cm: f64,

    /// Scale applied to the yaw controller output to get a rotation in degrees
    pub rotate_scale: f64,

    /// Maximum correction rotation in degrees
    pub max_rotate_deg: f64,

    /// Rotations smaller than this are not sent, in degrees
    pub min_rotate_deg: f64,

    /// Rotation sent while the target isn't visible, in degrees. Positive is clockwise.
    pub search_rotate_deg: i64,

    /// Vertical moves smaller than this are not sent, in centimeters
    pub min_vert_move_cm: f64,
}
