//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::env;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "DRONE_NAV_SW_ROOT";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable ({0}) is not set")]
    SwRootNotSet(&'static str),

    #[error("The software root {0:?} is not a directory")]
    SwRootNotDir(PathBuf),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the software, as given by the `DRONE_NAV_SW_ROOT`
/// environment variable.
pub fn get_sw_root() -> Result<PathBuf, HostError> {
    let root = match env::var_os(SW_ROOT_ENV_VAR) {
        Some(r) => PathBuf::from(r),
        None => return Err(HostError::SwRootNotSet(SW_ROOT_ENV_VAR)),
    };

    if !root.is_dir() {
        return Err(HostError::SwRootNotDir(root));
    }

    Ok(root)
}

/// Get a short description of the host this software is running on.
pub fn get_host_description() -> String {
    format!(
        "{} ({}, {} family)",
        env::consts::OS,
        env::consts::ARCH,
        env::consts::FAMILY
    )
}
