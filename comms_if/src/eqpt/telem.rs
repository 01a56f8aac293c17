//! # Vehicle Telemetry
//!
//! The vehicle broadcasts its state as a semicolon-separated list of `key:value` pairs, for
//! example:
//!
//! ```text
//! pitch:0;roll:0;yaw:-12;vgx:0;vgy:0;vgz:0;templ:62;temph:65;tof:10;h:0;bat:87;baro:168.65;time:0;
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A snapshot of the vehicle's state.
///
/// A snapshot is only ever constructed when both the height and battery fields were present and
/// numeric. Any other field missing from the feed is left at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Height above the takeoff point in centimeters
    pub height_cm: i32,

    /// Battery charge in percent
    pub battery_percent: i32,

    /// Time of flight sensor distance in centimeters
    pub time_of_flight_cm: i32,

    /// Velocities in the x, y and z axes in decimeters/second
    pub velocity: [i32; 3],

    /// Accelerations in the x, y and z axes in 0.001g
    pub acceleration: [f64; 3],

    /// Pitch attitude in degrees
    pub pitch_deg: i32,

    /// Roll attitude in degrees
    pub roll_deg: i32,

    /// Yaw attitude in degrees
    pub yaw_deg: i32,

    /// Lowest and highest temperature in degrees celsius
    pub temperature_c: (i32, i32),

    /// Barometer altitude in meters
    pub barometer_m: f64,

    /// Motor on time in seconds
    pub flight_time_s: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TelemParseError {
    #[error("Telemetry is missing the required \"{0}\" field")]
    MissingField(&'static str),

    #[error("Telemetry field \"{0}\" has non-numeric value \"{1}\"")]
    NonNumeric(&'static str, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FromStr for VehicleState {
    type Err = TelemParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut state = VehicleState::default();
        let mut height = None;
        let mut battery = None;

        for pair in s.trim().split(';') {
            let (key, value) = match split_pair(pair) {
                Some(kv) => kv,
                None => continue,
            };

            // Height and battery are validated, malformed optional fields are ignored
            match key {
                "h" => height = Some(parse_required("h", value)?),
                "bat" => battery = Some(parse_required("bat", value)?),
                _ => {
                    let v: f64 = match value.parse() {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    state.set_optional(key, v);
                }
            }
        }

        state.height_cm = height.ok_or(TelemParseError::MissingField("h"))?;
        state.battery_percent = battery.ok_or(TelemParseError::MissingField("bat"))?;

        Ok(state)
    }
}

impl VehicleState {
    fn set_optional(&mut self, key: &str, v: f64) {
        let i = v.round() as i32;
        match key {
            "tof" => self.time_of_flight_cm = i,
            "vgx" => self.velocity[0] = i,
            "vgy" => self.velocity[1] = i,
            "vgz" => self.velocity[2] = i,
            "agx" => self.acceleration[0] = v,
            "agy" => self.acceleration[1] = v,
            "agz" => self.acceleration[2] = v,
            "pitch" => self.pitch_deg = i,
            "roll" => self.roll_deg = i,
            "yaw" => self.yaw_deg = i,
            "templ" => self.temperature_c.0 = i,
            "temph" => self.temperature_c.1 = i,
            "baro" => self.barometer_m = v,
            "time" => self.flight_time_s = i,
            _ => (),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let mut it = pair.splitn(2, ':');
    let key = it.next()?.trim();
    let value = it.next()?.trim();

    if key.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

fn parse_required(key: &'static str, value: &str) -> Result<i32, TelemParseError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v.round() as i32),
        _ => Err(TelemParseError::NonNumeric(key, String::from(value))),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let s: VehicleState = "h:45;bat:80;tof:50".parse().unwrap();
        assert_eq!(s.height_cm, 45);
        assert_eq!(s.battery_percent, 80);
        assert_eq!(s.time_of_flight_cm, 50);
    }

    #[test]
    fn test_parse_full_feed() {
        let s: VehicleState = "pitch:1;roll:-2;yaw:-12;vgx:3;vgy:0;vgz:-1;templ:62;temph:65;\
            tof:10;h:120;bat:87;baro:168.65;time:14;agx:-3.00;agy:1.00;agz:-999.00;\r\n"
            .parse()
            .unwrap();

        assert_eq!(s.height_cm, 120);
        assert_eq!(s.battery_percent, 87);
        assert_eq!(s.yaw_deg, -12);
        assert_eq!(s.velocity, [3, 0, -1]);
        assert_eq!(s.temperature_c, (62, 65));
        assert_eq!(s.flight_time_s, 14);
        assert!((s.barometer_m - 168.65).abs() < 1e-9);
        assert!((s.acceleration[2] + 999.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_missing_required() {
        assert_eq!(
            "bat:80".parse::<VehicleState>(),
            Err(TelemParseError::MissingField("h"))
        );
        assert_eq!(
            "h:10;tof:4".parse::<VehicleState>(),
            Err(TelemParseError::MissingField("bat"))
        );
        assert_eq!(
            "h:abc;bat:80".parse::<VehicleState>(),
            Err(TelemParseError::NonNumeric("h", String::from("abc")))
        );
    }

    #[test]
    fn test_parse_ignores_unknown_and_malformed() {
        let s: VehicleState = "foo:bar;h:5;;bat:9;tof:x;mid:-1".parse().unwrap();
        assert_eq!(s.height_cm, 5);
        assert_eq!(s.battery_percent, 9);
        assert_eq!(s.time_of_flight_cm, 0);
    }
}
