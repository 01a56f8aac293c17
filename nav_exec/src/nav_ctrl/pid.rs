//! # PID controller module
//!
//! A single-axis PID controller with output clamping and integral anti-windup.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Instant;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains and limits of one PID axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Minimum output of the controller
    pub min_output: f64,

    /// Maximum output of the controller
    pub max_output: f64,
}

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    params: PidParams,

    /// Limit applied to the magnitude of the integral accumulation, before it is scaled by `k_i`
    integral_limit: f64,

    /// The integral accumulation
    integral: f64,

    /// Previous error
    last_error: f64,

    /// Previous instant that the error was passed in, or the instant of the last reset
    #[serde(skip)]
    last_time: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains and limits.
    pub fn new(params: PidParams, integral_limit: f64) -> Self {
        // Guard against swapped limits in a parameter file
        let params = PidParams {
            min_output: params.min_output.min(params.max_output),
            max_output: params.min_output.max(params.max_output),
            ..params
        };

        Self {
            params,
            integral_limit: integral_limit.abs(),
            integral: 0.0,
            last_error: 0.0,
            last_time: Instant::now(),
        }
    }

    /// Get the value of the controller for the given error.
    ///
    /// This function is time-aware so there is no need to pass in a delta-time value.
    pub fn calculate(&mut self, error: f64) -> f64 {
        self.calculate_at(error, Instant::now())
    }

    /// Get the value of the controller for the given error observed at `now`.
    ///
    /// An instant earlier than the previous one is treated as no time having passed.
    pub fn calculate_at(&mut self, error: f64, now: Instant) -> f64 {
        // A non-finite error would poison the integral permanently
        let error = if error.is_finite() { error } else { 0.0 };

        let dt = now
            .checked_duration_since(self.last_time)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let prop = self.params.k_p * error;

        self.integral =
            (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);
        let integ = self.params.k_i * self.integral;

        // With no time difference there is no meaningful derivative
        let deriv = if dt > 0.0 {
            self.params.k_d * (error - self.last_error) / dt
        } else {
            0.0
        };

        self.last_error = error;
        self.last_time = now;

        (prop + integ + deriv).clamp(self.params.min_output, self.params.max_output)
    }

    /// Clear the integral and previous error, and restart the clock from now.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now())
    }

    /// Clear the integral and previous error, restarting the clock from `now`.
    pub fn reset_at(&mut self, now: Instant) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_time = now;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn params(k_p: f64, k_i: f64, k_d: f64) -> PidParams {
        PidParams {
            k_p,
            k_i,
            k_d,
            min_output: -100.0,
            max_output: 100.0,
        }
    }

    #[test]
    fn test_first_call_has_no_derivative() {
        let mut pid = PidController::new(params(0.0, 0.0, 10.0), 100.0);
        let t0 = Instant::now();
        pid.reset_at(t0);

        // Same instant as the reset, dt is zero
        assert_eq!(pid.calculate_at(50.0, t0), 0.0);
        assert_eq!(pid.last_error(), 50.0);
    }

    #[test]
    fn test_terms() {
        let mut pid = PidController::new(params(0.5, 0.1, 0.2), 100.0);
        let t0 = Instant::now();
        pid.reset_at(t0);

        // dt = 2, integral = 20, derivative = (10 - 0) / 2 = 5
        let out = pid.calculate_at(10.0, t0 + Duration::from_secs(2));
        assert!((out - (5.0 + 2.0 + 1.0)).abs() < 1e-9);
        assert!((pid.integral() - 20.0).abs() < 1e-9);

        // dt = 1, integral = 24, derivative = (4 - 10) / 1 = -6
        let out = pid.calculate_at(4.0, t0 + Duration::from_secs(3));
        assert!((out - (2.0 + 2.4 - 1.2)).abs() < 1e-9);
    }

    #[test]
    fn test_integral_anti_windup() {
        let mut pid = PidController::new(params(0.0, 1.0, 0.0), 100.0);
        let t0 = Instant::now();
        pid.reset_at(t0);

        for i in 1..=10 {
            pid.calculate_at(500.0, t0 + Duration::from_secs(i));
        }
        assert_eq!(pid.integral(), 100.0);

        for i in 11..=30 {
            pid.calculate_at(-500.0, t0 + Duration::from_secs(i));
        }
        assert_eq!(pid.integral(), -100.0);
    }

    #[test]
    fn test_output_clamp() {
        let mut pid = PidController::new(
            PidParams {
                k_p: 3.0,
                k_i: 0.5,
                k_d: 2.0,
                min_output: -20.0,
                max_output: 35.0,
            },
            100.0,
        );
        let t0 = Instant::now();
        pid.reset_at(t0);

        let errors = [0.0, 400.0, -900.0, 12.0, 1e9, -1e9, 3.0, std::f64::NAN, 0.5];
        for (i, e) in errors.iter().enumerate() {
            let out = pid.calculate_at(*e, t0 + Duration::from_millis(10 * i as u64));
            assert!(out >= -20.0 && out <= 35.0, "output {} out of range", out);
        }
    }

    #[test]
    fn test_reset_idempotent() {
        let mut pid = PidController::new(params(1.0, 1.0, 1.0), 100.0);
        let t0 = Instant::now();
        pid.reset_at(t0);
        pid.calculate_at(40.0, t0 + Duration::from_secs(1));
        assert!(pid.integral() != 0.0);

        pid.reset();
        let once = (pid.integral(), pid.last_error());
        pid.reset();
        assert_eq!(once, (0.0, 0.0));
        assert_eq!((pid.integral(), pid.last_error()), once);
    }

    #[test]
    fn test_reset_restamps_clock() {
        let mut pid = PidController::new(params(0.0, 0.0, 1.0), 100.0);
        let t0 = Instant::now();
        pid.reset_at(t0);
        pid.calculate_at(10.0, t0 + Duration::from_secs(1));

        // After a reset at t1 a call at t1 sees no elapsed time, so no derivative kick
        let t1 = t0 + Duration::from_secs(60);
        pid.reset_at(t1);
        assert_eq!(pid.calculate_at(30.0, t1), 0.0);
    }
}
