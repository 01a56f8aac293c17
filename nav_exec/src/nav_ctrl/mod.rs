//! # Navigation control module
//!
//! Navigation control turns the detection for each frame into a single vehicle command. The
//! decision is made by a [`NavigationPolicy`], of which two are provided:
//!
//! - [`PidPolicy`] - aligns the target in the frame using PID controllers on the horizontal and
//!   vertical errors, then closes the range once the target is centred, landing when the target
//!   fills enough of the frame.
//! - [`ExternalPolicy`] - forwards the commands supplied by the orchestrator, one per cycle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod geometry;
mod params;
pub mod pid;
mod policy;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::NavCtrlParams;
pub use policy::{ExternalPolicy, NavigationPolicy, PidPolicy, PolicyKind};
