//! # Navigation policies

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::{Deserialize, Serialize};
use std::{sync::mpsc::Receiver, time::Instant};

// Internal
use super::{geometry, pid::PidController, NavCtrlParams};
use comms_if::eqpt::{detect::Detection, drone::DroneCmd, telem::VehicleState};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A strategy deciding which command to send to the vehicle each cycle.
pub trait NavigationPolicy: Send {
    /// Decide on the command for this cycle.
    ///
    /// Returns `None` when the policy has nothing to send this cycle.
    fn decide(
        &mut self,
        detection: &Detection,
        state: Option<&VehicleState>,
    ) -> Option<DroneCmd>;

    /// Clear any state carried between cycles.
    fn reset(&mut self);

    /// Short name of the policy for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Deterministic policy using PID controllers to centre then approach the target.
#[derive(Debug, Clone)]
pub struct PidPolicy {
    params: NavCtrlParams,

    /// Horizontal error controller, output drives rotation
    yaw_ctrl: PidController,

    /// Vertical error controller, output drives altitude changes
    vert_ctrl: PidController,

    /// Forward axis controller.
    ///
    /// Currently range is closed with a coverage based hop so this controller is not stepped,
    /// but it is reset alongside the others.
    fwd_ctrl: PidController,
}

/// Policy which forwards commands supplied by the orchestrator.
pub struct ExternalPolicy {
    cmds: Receiver<DroneCmd>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The available policy kinds, as selected in the parameter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Pid,
    External,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidPolicy {
    pub fn new(params: NavCtrlParams) -> Self {
        Self {
            yaw_ctrl: PidController::new(params.yaw_pid, params.integral_limit),
            vert_ctrl: PidController::new(params.vert_pid, params.integral_limit),
            fwd_ctrl: PidController::new(params.fwd_pid, params.integral_limit),
            params,
        }
    }

    /// Decide on the command for a detection observed at `now`.
    ///
    /// The first matching rule wins:
    /// 1. No target: reset the controllers and rotate to search.
    /// 2. Coverage at or above the landing threshold: reset the controllers and land.
    /// 3. Both axes within the centering tolerance: fly forward, less the closer the target is.
    /// 4. Horizontal error dominates and the rotation is large enough: rotate towards it.
    /// 5. Vertical move is large enough: climb or descend towards it.
    /// 6. Otherwise a minimum forward hop.
    pub fn decide_at(&mut self, detection: &Detection, now: Instant) -> DroneCmd {
        let p = &self.params;

        let bbox = match detection.object_box {
            Some(b) => b,
            None => {
                self.reset_at(now);
                return DroneCmd::rotate(self.params.search_rotate_deg);
            }
        };

        if detection.coverage_percent >= p.landing_coverage_percent {
            self.reset_at(now);
            return DroneCmd::Land;
        }

        let err = geometry::align_error(&bbox, detection.frame_width, detection.frame_height);
        let yaw_out = self.yaw_ctrl.calculate_at(err.horizontal_px, now);
        let vert_out = self.vert_ctrl.calculate_at(err.vertical_px, now);

        debug!(
            "Errors: h = {:.1} px, v = {:.1} px, coverage = {} %, ctrl: yaw = {:.2} vert = {:.2}",
            err.horizontal_px, err.vertical_px, detection.coverage_percent, yaw_out, vert_out
        );

        let h_abs = err.horizontal_px.abs();
        let v_abs = err.vertical_px.abs();

        if h_abs < p.centering_tolerance_px && v_abs < p.centering_tolerance_px {
            let uncovered = 100.0 - detection.coverage_percent as f64;
            let dist = (uncovered * p.forward_gain_cm)
                .max(p.min_move_cm)
                .min(p.max_move_cm);
            return DroneCmd::forward(dist.round() as i64);
        }

        // Only one axis is corrected per command
        if h_abs > v_abs {
            let angle = (yaw_out.abs() * p.rotate_scale).min(p.max_rotate_deg).round();
            if angle >= p.min_rotate_deg {
                return DroneCmd::rotate(angle as i64 * signum(yaw_out));
            }
        }

        let delta = vert_out.abs().min(p.max_move_cm).round();
        if delta >= p.min_vert_move_cm {
            return DroneCmd::vertical(delta as i64 * signum(vert_out));
        }

        DroneCmd::forward(p.min_move_cm.round() as i64)
    }

    fn reset_at(&mut self, now: Instant) {
        self.yaw_ctrl.reset_at(now);
        self.vert_ctrl.reset_at(now);
        self.fwd_ctrl.reset_at(now);
    }

    pub fn yaw_ctrl(&self) -> &PidController {
        &self.yaw_ctrl
    }

    pub fn vert_ctrl(&self) -> &PidController {
        &self.vert_ctrl
    }
}

impl NavigationPolicy for PidPolicy {
    fn decide(
        &mut self,
        detection: &Detection,
        _state: Option<&VehicleState>,
    ) -> Option<DroneCmd> {
        Some(self.decide_at(detection, Instant::now()))
    }

    fn reset(&mut self) {
        self.reset_at(Instant::now())
    }

    fn name(&self) -> &'static str {
        "pid"
    }
}

impl ExternalPolicy {
    /// Create a policy which sends the commands received on `cmds`, in order, one per cycle.
    pub fn new(cmds: Receiver<DroneCmd>) -> Self {
        Self { cmds }
    }
}

impl NavigationPolicy for ExternalPolicy {
    fn decide(
        &mut self,
        _detection: &Detection,
        _state: Option<&VehicleState>,
    ) -> Option<DroneCmd> {
        self.cmds.try_recv().ok()
    }

    fn reset(&mut self) {
        // Commands queued for a previous mission are stale
        while self.cmds.try_recv().is_ok() {}
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn signum(v: f64) -> i64 {
    if v < 0.0 {
        -1
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::nav_ctrl::pid::PidParams;
    use comms_if::eqpt::detect::BoundingBox;
    use std::{sync::mpsc::channel, time::Duration};

    fn test_params() -> NavCtrlParams {
        let limits = |k_p, k_i, k_d| PidParams {
            k_p,
            k_i,
            k_d,
            min_output: -100.0,
            max_output: 100.0,
        };

        NavCtrlParams {
            yaw_pid: limits(0.15, 0.01, 0.05),
            vert_pid: limits(0.10, 0.01, 0.03),
            fwd_pid: limits(0.0, 0.0, 0.0),
            integral_limit: 100.0,
            landing_coverage_percent: 75,
            centering_tolerance_px: 50.0,
            min_move_cm: 20.0,
            max_move_cm: 100.0,
            forward_gain_cm: 1.5,
            rotate_scale: 0.5,
            max_rotate_deg: 45.0,
            min_rotate_deg: 5.0,
            search_rotate_deg: 30,
            min_vert_move_cm: 20.0,
        }
    }

    fn detection(bbox: Option<BoundingBox>) -> Detection {
        geometry::detection(960, 720, bbox)
    }

    /// A box of the given size centred on the given point.
    fn box_at(cx: f64, cy: f64, w: f64, h: f64) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        ))
    }

    #[test]
    fn test_centred_far_target_flies_forward() {
        let mut policy = PidPolicy::new(test_params());
        let det = detection(Some(BoundingBox::new(380.0, 260.0, 580.0, 460.0)));
        assert_eq!(det.coverage_percent, 6);

        let cmd = policy.decide_at(&det, Instant::now());
        assert_eq!(cmd, DroneCmd::Forward(100));
        assert_eq!(cmd.to_string(), "forward 100");
    }

    #[test]
    fn test_centred_near_target_hops_less() {
        let mut policy = PidPolicy::new(test_params());

        // 60 % coverage, (100 - 60) * 1.5 = 60
        let det = detection(box_at(480.0, 360.0, 960.0 * 0.75, 720.0 * 0.8));
        assert_eq!(det.coverage_percent, 60);
        assert_eq!(policy.decide_at(&det, Instant::now()), DroneCmd::Forward(60));

        // 74 % coverage, (100 - 74) * 1.5 = 39
        let det = detection(box_at(480.0, 360.0, 960.0 * 0.925, 720.0 * 0.8));
        assert_eq!(det.coverage_percent, 74);
        assert_eq!(policy.decide_at(&det, Instant::now()), DroneCmd::Forward(39));
    }

    #[test]
    fn test_no_target_searches_and_resets() {
        let mut policy = PidPolicy::new(test_params());
        let t0 = Instant::now();

        // Build up some integral first
        let off = detection(box_at(800.0, 100.0, 50.0, 50.0));
        policy.decide_at(&off, t0);
        policy.decide_at(&off, t0 + Duration::from_secs(1));
        assert!(policy.yaw_ctrl().integral() != 0.0);
        assert!(policy.vert_ctrl().integral() != 0.0);

        let cmd = policy.decide_at(&detection(None), t0 + Duration::from_secs(2));
        assert_eq!(cmd, DroneCmd::Cw(30));
        assert_eq!(cmd.to_string(), "cw 30");
        assert_eq!(policy.yaw_ctrl().integral(), 0.0);
        assert_eq!(policy.vert_ctrl().integral(), 0.0);
        assert_eq!(policy.yaw_ctrl().last_error(), 0.0);
    }

    #[test]
    fn test_large_coverage_lands() {
        let mut policy = PidPolicy::new(test_params());

        let det = detection(Some(BoundingBox::new(0.0, 0.0, 912.0, 684.0)));
        assert_eq!(det.coverage_percent, 90);
        assert_eq!(policy.decide_at(&det, Instant::now()), DroneCmd::Land);

        // Lands however far off centre the box is
        let det = detection(Some(BoundingBox::new(0.0, 0.0, 960.0, 560.0)));
        assert!(det.coverage_percent >= 75);
        assert_eq!(policy.decide_at(&det, Instant::now()), DroneCmd::Land);
        assert_eq!(policy.yaw_ctrl().integral(), 0.0);
    }

    #[test]
    fn test_horizontal_error_rotates() {
        let mut policy = PidPolicy::new(test_params());
        let t0 = Instant::now();

        // 300 px right, 10 px up: P = 45, I = 0, D = 0 at dt = 0 => 22.5 -> 23 deg
        let det = detection(box_at(780.0, 350.0, 100.0, 100.0));
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Cw(23));

        let mut policy = PidPolicy::new(test_params());
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);
        let det = detection(box_at(180.0, 350.0, 100.0, 100.0));
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Ccw(23));
    }

    #[test]
    fn test_rotation_capped() {
        let mut params = test_params();
        params.yaw_pid.k_p = 5.0;
        let mut policy = PidPolicy::new(params);
        let t0 = Instant::now();
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);

        let det = detection(box_at(900.0, 360.0, 40.0, 40.0));
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Cw(45));
    }

    #[test]
    fn test_vertical_error_climbs_or_descends() {
        let t0 = Instant::now();

        // 300 px above centre, 0 px horizontally: P = 30 cm
        let mut policy = PidPolicy::new(test_params());
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);
        let det = detection(box_at(480.0, 60.0, 100.0, 100.0));
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Up(30));

        let mut policy = PidPolicy::new(test_params());
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);
        let det = detection(box_at(480.0, 660.0, 100.0, 100.0));
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Down(30));
    }

    #[test]
    fn test_small_rotation_falls_through_to_vertical() {
        let t0 = Instant::now();
        let mut policy = PidPolicy::new(test_params());
        policy.yaw_ctrl.reset_at(t0);
        policy.vert_ctrl.reset_at(t0);

        // 55 px right gives a 4 deg rotation and 52 px up a 5 cm climb, both under threshold
        let det = detection(box_at(535.0, 308.0, 40.0, 40.0));
        assert_eq!(policy.decide_at(&det, t0), DroneCmd::Forward(20));
    }

    #[test]
    fn test_every_command_in_grammar_range() {
        let mut policy = PidPolicy::new(test_params());
        let t0 = Instant::now();

        let mut i = 0u64;
        for cx in (0..=960).step_by(60) {
            for cy in (0..=720).step_by(60) {
                for size in [20.0, 200.0, 500.0].iter() {
                    i += 1;
                    let det = detection(box_at(cx as f64, cy as f64, *size, *size));
                    let cmd = policy.decide_at(&det, t0 + Duration::from_millis(300 * i));
                    match cmd {
                        DroneCmd::Cw(v) | DroneCmd::Ccw(v) => assert!(v >= 1 && v <= 360),
                        DroneCmd::Up(v) | DroneCmd::Down(v) | DroneCmd::Forward(v) => {
                            assert!(v >= 20 && v <= 500)
                        }
                        DroneCmd::Land => (),
                        c => panic!("Unexpected command {:?}", c),
                    }
                }
            }
        }
    }

    #[test]
    fn test_external_policy() {
        let (tx, rx) = channel();
        let mut policy = ExternalPolicy::new(rx);
        let det = detection(None);

        assert_eq!(policy.decide(&det, None), None);

        tx.send(DroneCmd::Up(40)).unwrap();
        tx.send(DroneCmd::Cw(90)).unwrap();
        assert_eq!(policy.decide(&det, None), Some(DroneCmd::Up(40)));
        assert_eq!(policy.decide(&det, None), Some(DroneCmd::Cw(90)));
        assert_eq!(policy.decide(&det, None), None);

        tx.send(DroneCmd::Land).unwrap();
        policy.reset();
        assert_eq!(policy.decide(&det, None), None);
    }
}
