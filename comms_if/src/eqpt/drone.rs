//! # Drone Command Grammar
//!
//! The subset of the vehicle's text command protocol which the navigation software can emit, and
//! the acknowledgements the vehicle sends back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum and maximum rotation accepted by `cw`/`ccw`, in degrees.
pub const ROTATE_RANGE_DEG: (u32, u32) = (1, 360);

/// Minimum and maximum distance accepted by `up`/`down`/`forward`, in centimeters.
pub const MOVE_RANGE_CM: (u32, u32) = (20, 500);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command sent to the vehicle.
///
/// Values carried by the variants are always inside the ranges accepted by the vehicle, the
/// constructors clamp and parsing rejects out of range values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DroneCmd {
    /// Enter SDK command mode
    Command,

    /// Start the video stream
    StreamOn,

    Takeoff,
    Land,

    /// Rotate clockwise by the given degrees
    Cw(u32),

    /// Rotate counter-clockwise by the given degrees
    Ccw(u32),

    /// Ascend by the given centimeters
    Up(u32),

    /// Descend by the given centimeters
    Down(u32),

    /// Fly forward by the given centimeters
    Forward(u32),
}

/// An acknowledgement from the vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DroneAck {
    Ok,
    Error(String),

    /// Any other text, for example the response to a read command such as `battery?`
    Value(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DroneCmdParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command \"{0}\"")]
    UnknownCommand(String),

    #[error("Command \"{0}\" expects a single integer argument")]
    InvalidArgument(String),

    #[error("Argument {1} of \"{0}\" is outside [{2}, {3}]")]
    OutOfRange(String, u32, u32, u32),

    #[error("Command \"{0}\" takes no arguments")]
    UnexpectedArgument(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DroneCmd {
    /// Rotation by a signed angle, positive being clockwise. The magnitude is clamped into the
    /// accepted rotation range.
    pub fn rotate(angle_deg: i64) -> Self {
        let mag = clamp_u32(angle_deg.abs(), ROTATE_RANGE_DEG);
        if angle_deg >= 0 {
            DroneCmd::Cw(mag)
        } else {
            DroneCmd::Ccw(mag)
        }
    }

    /// Vertical move by a signed distance, positive being up. The magnitude is clamped into the
    /// accepted move range.
    pub fn vertical(dist_cm: i64) -> Self {
        let mag = clamp_u32(dist_cm.abs(), MOVE_RANGE_CM);
        if dist_cm >= 0 {
            DroneCmd::Up(mag)
        } else {
            DroneCmd::Down(mag)
        }
    }

    /// Forward move clamped into the accepted move range.
    pub fn forward(dist_cm: i64) -> Self {
        DroneCmd::Forward(clamp_u32(dist_cm, MOVE_RANGE_CM))
    }

    /// The command keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            DroneCmd::Command => "command",
            DroneCmd::StreamOn => "streamon",
            DroneCmd::Takeoff => "takeoff",
            DroneCmd::Land => "land",
            DroneCmd::Cw(_) => "cw",
            DroneCmd::Ccw(_) => "ccw",
            DroneCmd::Up(_) => "up",
            DroneCmd::Down(_) => "down",
            DroneCmd::Forward(_) => "forward",
        }
    }

    /// The numeric argument of the command, if it has one.
    pub fn argument(&self) -> Option<u32> {
        match *self {
            DroneCmd::Cw(v)
            | DroneCmd::Ccw(v)
            | DroneCmd::Up(v)
            | DroneCmd::Down(v)
            | DroneCmd::Forward(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for DroneCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument() {
            Some(v) => write!(f, "{} {}", self.keyword(), v),
            None => write!(f, "{}", self.keyword()),
        }
    }
}

impl FromStr for DroneCmd {
    type Err = DroneCmdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();

        let keyword = match words.next() {
            Some(k) => k.to_lowercase(),
            None => return Err(DroneCmdParseError::Empty),
        };
        let arg = words.next();

        if words.next().is_some() {
            return Err(DroneCmdParseError::InvalidArgument(keyword));
        }

        let no_arg = |cmd: DroneCmd| match arg {
            None => Ok(cmd),
            Some(_) => Err(DroneCmdParseError::UnexpectedArgument(keyword.clone())),
        };

        match keyword.as_str() {
            "command" => no_arg(DroneCmd::Command),
            "streamon" => no_arg(DroneCmd::StreamOn),
            "takeoff" => no_arg(DroneCmd::Takeoff),
            "land" => no_arg(DroneCmd::Land),
            "cw" => Ok(DroneCmd::Cw(parse_arg(&keyword, arg, ROTATE_RANGE_DEG)?)),
            "ccw" => Ok(DroneCmd::Ccw(parse_arg(&keyword, arg, ROTATE_RANGE_DEG)?)),
            "up" => Ok(DroneCmd::Up(parse_arg(&keyword, arg, MOVE_RANGE_CM)?)),
            "down" => Ok(DroneCmd::Down(parse_arg(&keyword, arg, MOVE_RANGE_CM)?)),
            "forward" => Ok(DroneCmd::Forward(parse_arg(&keyword, arg, MOVE_RANGE_CM)?)),
            _ => Err(DroneCmdParseError::UnknownCommand(keyword.clone())),
        }
    }
}

impl DroneAck {
    /// Parse an acknowledgement datagram's text.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if s.eq_ignore_ascii_case("ok") {
            DroneAck::Ok
        } else if s.to_lowercase().starts_with("error") {
            DroneAck::Error(String::from(s))
        } else {
            DroneAck::Value(String::from(s))
        }
    }
}

impl fmt::Display for DroneAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroneAck::Ok => write!(f, "ok"),
            DroneAck::Error(s) | DroneAck::Value(s) => write!(f, "{}", s),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn clamp_u32(value: i64, range: (u32, u32)) -> u32 {
    value.max(range.0 as i64).min(range.1 as i64) as u32
}

fn parse_arg(
    keyword: &str,
    arg: Option<&str>,
    range: (u32, u32),
) -> Result<u32, DroneCmdParseError> {
    let value: u32 = arg
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| DroneCmdParseError::InvalidArgument(String::from(keyword)))?;

    if value < range.0 || value > range.1 {
        return Err(DroneCmdParseError::OutOfRange(
            String::from(keyword),
            value,
            range.0,
            range.1,
        ));
    }

    Ok(value)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
