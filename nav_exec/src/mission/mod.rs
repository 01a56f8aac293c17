//! # Mission module
//!
//! The mission module manages the lifecycle of missions. At most one mission runs at a time, on
//! its own thread, driven by the [`MissionController`].
//!
//! ```text
//! Idle -> [TakingOff ->] Active -> Landing -> Complete -> Idle
//!                          |
//!                          +-----> Aborted -> Idle
//! ```
//!
//! Starting a mission while another is running cancels the running one and waits for its loop to
//! exit before the new loop is started, so only one loop ever drives the vehicle. Re-arming the
//! vehicle session is held back until no loop is running for the same reason.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cancel;
mod cycle;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use cancel::CancelToken;
pub use cycle::{CycleError, CANCELLED_REASON, FAILED_CYCLES_REASON};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    sync::{
        mpsc::{channel, Sender},
        Arc, PoisonError, RwLock,
    },
    thread::{self, JoinHandle},
};

// Internal
use crate::{
    detect_client::ObjectDetector,
    frame_client::FrameSource,
    nav_ctrl::{ExternalPolicy, NavCtrlParams, NavigationPolicy, PidPolicy, PolicyKind},
    params::MissionParams,
    telem_store::TelemStore,
    vehicle_client::CommandSink,
};
use comms_if::{eqpt::drone::DroneCmd, orch::OrchMsg};
use cycle::LoopContext;
use util::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shared view of the current mission state.
#[derive(Debug, Clone, Default)]
pub struct MissionStatus(Arc<RwLock<MissionState>>);

/// A single run towards one target.
#[derive(Debug)]
pub struct Mission {
    /// Sequence number of this mission within the session, starting at 1
    pub number: u64,

    pub target_label: String,

    pub cycle_count: u64,

    pub cancel: CancelToken,
}

/// The I/O a mission loop needs exclusively. Handed to each mission and back again when it ends.
pub struct MissionResources {
    pub frames: Box<dyn FrameSource>,
    pub detector: Box<dyn ObjectDetector>,
}

/// Record of a finished mission, archived in the session.
#[derive(Debug, Clone, Serialize)]
pub struct MissionSummary {
    pub number: u64,
    pub target: String,
    pub cycle_count: u64,
    pub outcome: MissionOutcome,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Every command sent to the vehicle by the mission, in order
    pub commands: Vec<String>,
}

/// Owner of the mission lifecycle.
pub struct MissionController {
    params: MissionParams,
    nav_ctrl_params: NavCtrlParams,

    telem: Arc<TelemStore>,
    vehicle: Arc<dyn CommandSink>,
    upstream: Sender<OrchMsg>,
    session: Option<Session>,

    status: MissionStatus,

    /// `None` while a mission holds them
    resources: Option<MissionResources>,

    active: Option<ActiveMission>,

    /// Set when the session must be re-armed once the running mission has ended
    rearm_pending: bool,

    num_missions: u64,
}

struct ActiveMission {
    target_label: String,
    cancel: CancelToken,
    handle: JoinHandle<MissionResources>,

    /// Queue of the external policy, if that is the policy in use
    external_cmds: Option<Sender<DroneCmd>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissionState {
    Idle,
    TakingOff,
    Active,
    Landing,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "kebab-case")]
pub enum MissionOutcome {
    Complete,
    Aborted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("A mission needs a non-empty target label")]
    EmptyLabel,

    #[error("The mission resources were lost by a previous mission")]
    ResourcesUnavailable,

    #[error("Could not start the mission thread: {0}")]
    SpawnError(std::io::Error),

    #[error("The mission loop panicked")]
    LoopPanicked,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MissionState {
    fn default() -> Self {
        MissionState::Idle
    }
}

impl MissionStatus {
    pub fn get(&self) -> MissionState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, state: MissionState) {
        let mut current = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            info!("Mission state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }
}

impl MissionController {
    pub fn new(
        params: MissionParams,
        nav_ctrl_params: NavCtrlParams,
        telem: Arc<TelemStore>,
        vehicle: Arc<dyn CommandSink>,
        upstream: Sender<OrchMsg>,
        resources: MissionResources,
    ) -> Self {
        Self {
            params,
            nav_ctrl_params,
            telem,
            vehicle,
            upstream,
            session: None,
            status: MissionStatus::default(),
            resources: Some(resources),
            active: None,
            rearm_pending: false,
            num_missions: 0,
        }
    }

    /// Archive a summary of every mission in `session`.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Current state of the mission.
    ///
    /// A mission reads `TakingOff` or `Active` as soon as `start_mission` returns, and `Idle` as
    /// soon as its loop has ended, whether or not it has been reaped yet.
    pub fn state(&self) -> MissionState {
        self.status.get()
    }

    /// Arm the vehicle session, at start up or after the orchestrator (re)connects.
    ///
    /// While a mission runs this is deferred until its loop has exited.
    pub fn arm_session(&mut self) {
        if let Err(e) = self.reap() {
            warn!("{}", e);
        }

        match self.active {
            Some(ref a) => {
                info!(
                    "Mission towards \"{}\" in progress, arming the session once it ends",
                    a.target_label
                );
                self.rearm_pending = true;
            }
            None => self.arm_now(),
        }
    }

    /// Start a mission towards `label`.
    ///
    /// Any running mission is cancelled first, and this function blocks until its loop has
    /// exited.
    pub fn start_mission(&mut self, label: &str) -> Result<(), MissionError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(MissionError::EmptyLabel);
        }

        self.stop_mission()?;

        let resources = self
            .resources
            .take()
            .ok_or(MissionError::ResourcesUnavailable)?;

        let (policy, external_cmds) = match self.params.policy {
            PolicyKind::Pid => {
                let p: Box<dyn NavigationPolicy> =
                    Box::new(PidPolicy::new(self.nav_ctrl_params.clone()));
                (p, None)
            }
            PolicyKind::External => {
                let (tx, rx) = channel();
                let p: Box<dyn NavigationPolicy> = Box::new(ExternalPolicy::new(rx));
                (p, Some(tx))
            }
        };

        let initial = cycle::initial_state(&self.params, &self.telem);

        self.num_missions += 1;
        let cancel = CancelToken::new();
        let mission = Mission {
            number: self.num_missions,
            target_label: String::from(label),
            cycle_count: 0,
            cancel: cancel.clone(),
        };

        let ctx = LoopContext {
            params: self.params.clone(),
            telem: self.telem.clone(),
            vehicle: self.vehicle.clone(),
            upstream: self.upstream.clone(),
            status: self.status.clone(),
            session: self.session.clone(),
        };

        self.status.set(initial);

        let handle = match thread::Builder::new()
            .name(format!("mission_{}", self.num_missions))
            .spawn(move || cycle::run_mission(ctx, mission, initial, resources, policy))
        {
            Ok(h) => h,
            Err(e) => {
                self.status.set(MissionState::Idle);
                return Err(MissionError::SpawnError(e));
            }
        };

        self.active = Some(ActiveMission {
            target_label: String::from(label),
            cancel,
            handle,
            external_cmds,
        });

        Ok(())
    }

    /// Stop the running mission, waiting for its loop to exit.
    ///
    /// Does nothing if no mission is running.
    pub fn stop_mission(&mut self) -> Result<(), MissionError> {
        let active = match self.active.take() {
            Some(a) => a,
            None => {
                debug!("No mission to stop");
                return Ok(());
            }
        };

        info!("Stopping mission towards \"{}\"", active.target_label);
        active.cancel.cancel();

        self.join(active)
    }

    /// Collect a mission which has ended on its own.
    pub fn reap(&mut self) -> Result<(), MissionError> {
        match self.active {
            Some(ref a) if a.handle.is_finished() => (),
            _ => return Ok(()),
        }

        match self.active.take() {
            Some(a) => self.join(a),
            None => Ok(()),
        }
    }

    /// Handle a raw command string from the orchestrator.
    ///
    /// While idle the command is passed to the vehicle as is. While an external policy mission
    /// runs it is queued for that policy. Otherwise it is rejected, as the mission loop is the only
    /// writer on the vehicle link. Rejections are reported upstream.
    pub fn handle_raw_command(&mut self, raw: &str) {
        if let Err(e) = self.reap() {
            warn!("{}", e);
        }

        let response = match self.active {
            None => match self.vehicle.send_cmd(raw) {
                Ok(()) => None,
                Err(e) => Some(format!("command failed: {}", e)),
            },
            Some(ActiveMission {
                external_cmds: Some(ref tx),
                ..
            }) => match raw.parse::<DroneCmd>() {
                Ok(cmd) => {
                    info!("Queued {} for the external policy", cmd);
                    match tx.send(cmd) {
                        Ok(()) => None,
                        Err(_) => Some(String::from("command rejected: the mission has ended")),
                    }
                }
                Err(e) => Some(format!("invalid command \"{}\": {}", raw, e)),
            },
            Some(_) => Some(String::from("command rejected: a mission is in progress")),
        };

        if let Some(r) = response {
            warn!("{}", r);
            self.upstream.send(OrchMsg::Response(r)).ok();
        }
    }

    /// Stop any running mission ahead of exiting.
    pub fn shutdown(&mut self) -> Result<(), MissionError> {
        self.rearm_pending = false;
        self.stop_mission()
    }

    fn join(&mut self, active: ActiveMission) -> Result<(), MissionError> {
        let result = match active.handle.join() {
            Ok(resources) => {
                self.resources = Some(resources);
                Ok(())
            }
            Err(_) => {
                self.status.set(MissionState::Idle);
                Err(MissionError::LoopPanicked)
            }
        };

        if self.rearm_pending {
            self.arm_now();
        }

        result
    }

    fn arm_now(&mut self) {
        self.rearm_pending = false;
        if let Err(e) = self.vehicle.arm_session() {
            warn!("Could not arm the vehicle session: {}", e);
        }
    }
}

impl Drop for MissionController {
    fn drop(&mut self) {
        if let Err(e) = self.stop_mission() {
            warn!("{}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        detect_client::DetectClientError,
        frame_client::{Frame, FrameClientError},
        vehicle_client::VehicleClientError,
    };
    use comms_if::eqpt::{detect::NormBox, telem::VehicleState};
    use std::{
        sync::{
            mpsc::{Receiver, RecvTimeoutError},
            Mutex,
        },
        time::{Duration, Instant},
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// How long stalling mocks block for, long enough to stop the mission meanwhile
    const STALL: Duration = Duration::from_millis(300);

    /// Covers 90% of the frame
    const LANDING_BOX: NormBox = NormBox {
        x_min: 0.0,
        y_min: 0.0,
        x_max: 0.95,
        y_max: 0.95,
    };

    #[derive(Default)]
    struct MockVehicle {
        cmds: Mutex<Vec<String>>,
    }

    impl MockVehicle {
        fn cmds(&self) -> Vec<String> {
            self.cmds.lock().unwrap().clone()
        }
    }

    impl CommandSink for MockVehicle {
        fn send_cmd(&self, cmd: &str) -> Result<(), VehicleClientError> {
            self.cmds.lock().unwrap().push(String::from(cmd));
            Ok(())
        }
    }

    struct MockFrames {
        fail: bool,
    }

    impl FrameSource for MockFrames {
        fn capture(&mut self) -> Result<Frame, FrameClientError> {
            match self.fail {
                true => Err(FrameClientError::NoFrame),
                false => Ok(Frame {
                    timestamp: Utc::now(),
                    data: vec![0xff, 0xd8, 0xff],
                }),
            }
        }
    }

    /// Sees whatever box the test has placed in `target`
    struct MockDetector {
        target: Arc<Mutex<Option<NormBox>>>,
    }

    impl ObjectDetector for MockDetector {
        fn detect(
            &mut self,
            _image: &[u8],
            _label: &str,
        ) -> Result<Option<NormBox>, DetectClientError> {
            Ok(*self.target.lock().unwrap())
        }
    }

    struct Fixture {
        controller: MissionController,
        vehicle: Arc<MockVehicle>,
        telem: Arc<TelemStore>,
        target: Arc<Mutex<Option<NormBox>>>,
        upstream: Receiver<OrchMsg>,
    }

    /// Stalls on its first call, signalling `entered` when it does
    struct Stall {
        entered: Sender<()>,
        stalled: bool,
    }

    impl Stall {
        fn new(entered: Sender<()>) -> Self {
            Self {
                entered,
                stalled: false,
            }
        }

        fn once(&mut self) {
            if !self.stalled {
                self.stalled = true;
                self.entered.send(()).ok();
                std::thread::sleep(STALL);
            }
        }
    }

    struct StallingFrames(Stall);

    impl FrameSource for StallingFrames {
        fn capture(&mut self) -> Result<Frame, FrameClientError> {
            self.0.once();
            MockFrames { fail: false }.capture()
        }
    }

    /// Always sees a landing-sized target, after a stall
    struct StallingDetector(Stall);

    impl ObjectDetector for StallingDetector {
        fn detect(
            &mut self,
            _image: &[u8],
            _label: &str,
        ) -> Result<Option<NormBox>, DetectClientError> {
            self.0.once();
            Ok(Some(LANDING_BOX))
        }
    }

    fn mission_params(policy: PolicyKind) -> MissionParams {
        MissionParams {
            policy,
            frame_width: 960,
            frame_height: 720,
            cycle_period_s: 0.01,
            takeoff_height_threshold_cm: 30,
            takeoff_settle_s: 0.01,
            telem_stale_s: 10.0,
            max_consec_failed_cycles: 3,
        }
    }

    fn fixture(policy: PolicyKind, fail_capture: bool) -> Fixture {
        let target = Arc::new(Mutex::new(None));
        let resources = MissionResources {
            frames: Box::new(MockFrames { fail: fail_capture }),
            detector: Box::new(MockDetector {
                target: target.clone(),
            }),
        };

        fixture_with(mission_params(policy), resources, target)
    }

    fn fixture_with(
        params: MissionParams,
        resources: MissionResources,
        target: Arc<Mutex<Option<NormBox>>>,
    ) -> Fixture {
        let nav_ctrl_params: NavCtrlParams =
            util::params::from_toml_str(include_str!("../../../params/nav_ctrl.toml")).unwrap();

        let vehicle = Arc::new(MockVehicle::default());
        let telem = Arc::new(TelemStore::new());
        let (tx, upstream) = channel();

        let controller = MissionController::new(
            params,
            nav_ctrl_params,
            telem.clone(),
            vehicle.clone(),
            tx,
            resources,
        );

        Fixture {
            controller,
            vehicle,
            telem,
            target,
            upstream,
        }
    }

    fn set_height(telem: &TelemStore, height_cm: i32) {
        telem.set(VehicleState {
            height_cm,
            battery_percent: 80,
            ..Default::default()
        });
    }

    /// Receive messages until one matches `pred`, returning every message received.
    fn recv_until<F>(rx: &Receiver<OrchMsg>, pred: F) -> Vec<OrchMsg>
    where
        F: Fn(&OrchMsg) -> bool,
    {
        let start = Instant::now();
        let mut msgs = Vec::new();

        loop {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(m) => {
                    let done = pred(&m);
                    msgs.push(m);
                    if done {
                        return msgs;
                    }
                }
                Err(RecvTimeoutError::Timeout) if start.elapsed() < TIMEOUT => (),
                Err(e) => panic!("No matching message, got {:?} ({:?})", msgs, e),
            }
        }
    }

    fn is_response(msg: &OrchMsg, prefix: &str) -> bool {
        matches!(msg, OrchMsg::Response(r) if r.starts_with(prefix))
    }

    fn detection_cmd(msg: &OrchMsg) -> Option<&str> {
        match msg {
            OrchMsg::Detection(d) => d.command.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn test_land_completes_mission() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);
        *f.target.lock().unwrap() = Some(LANDING_BOX);

        f.controller.start_mission("red ball").unwrap();

        let msgs = recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            OrchMsg::Detection(d) => {
                assert_eq!(d.command.as_deref(), Some("land"));
                assert_eq!(d.detection.coverage_percent, 90);
                assert_eq!(d.cycle_count, 1);
                assert_eq!(d.telemetry.map(|t| t.height_cm), Some(100));
            }
            m => panic!("Expected a detection, got {:?}", m),
        }
        assert_eq!(
            msgs[1],
            OrchMsg::Complete(CompleteReport {
                cycle_count: 1,
                target: String::from("red ball")
            })
        );

        f.controller.stop_mission().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);
        assert_eq!(f.vehicle.cmds(), vec!["land"]);

        // Stopping a finished mission doesn't report an abort
        assert!(f.upstream.try_recv().is_err());
    }

    #[test]
    fn test_takeoff_when_low_or_unknown() {
        // No telemetry at all
        let mut f = fixture(PolicyKind::Pid, false);
        *f.target.lock().unwrap() = Some(LANDING_BOX);
        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));
        f.controller.stop_mission().unwrap();
        assert_eq!(f.vehicle.cmds(), vec!["takeoff", "land"]);

        // On the ground
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 10);
        *f.target.lock().unwrap() = Some(LANDING_BOX);
        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));
        f.controller.stop_mission().unwrap();
        assert_eq!(f.vehicle.cmds(), vec!["takeoff", "land"]);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut f = fixture(PolicyKind::Pid, false);
        f.controller.stop_mission().unwrap();
        f.controller.reap().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);
        assert!(f.upstream.try_recv().is_err());
        assert!(f.vehicle.cmds().is_empty());
    }

    #[test]
    fn test_empty_label_rejected() {
        let mut f = fixture(PolicyKind::Pid, false);
        match f.controller.start_mission("  ") {
            Err(MissionError::EmptyLabel) => (),
            r => panic!("Unexpected result {:?}", r),
        }
        assert_eq!(f.controller.state(), MissionState::Idle);
    }

    #[test]
    fn test_restart_cancels_running_mission() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);

        // Nothing in view, the first mission searches forever
        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| detection_cmd(m) == Some("cw 30"));

        f.controller.start_mission("blue box").unwrap();
        recv_until(&f.upstream, |m| {
            *m == OrchMsg::Response(format!("mission aborted: {}", CANCELLED_REASON))
        });

        *f.target.lock().unwrap() = Some(LANDING_BOX);
        let msgs = recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));
        match msgs.last() {
            Some(OrchMsg::Complete(c)) => assert_eq!(c.target, "blue box"),
            m => panic!("Expected completion, got {:?}", m),
        }

        f.controller.stop_mission().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);

        let cmds = f.vehicle.cmds();
        assert_eq!(cmds.last().map(String::as_str), Some("land"));
        assert!(cmds[..cmds.len() - 1].iter().all(|c| c == "cw 30"));
    }

    #[test]
    fn test_stop_reports_abort() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| detection_cmd(m).is_some());

        f.controller.stop_mission().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);

        let msgs: Vec<OrchMsg> = f.upstream.try_iter().collect();
        assert!(msgs.iter().any(|m| is_response(m, "mission aborted: cancelled")));

        // Nothing is sent after the loop has exited
        let num_cmds = f.vehicle.cmds().len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(f.vehicle.cmds().len(), num_cmds);
    }

    #[test]
    fn test_failed_cycles_abort_mission() {
        let mut f = fixture(PolicyKind::Pid, true);
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        let msgs = recv_until(&f.upstream, |m| is_response(m, "mission aborted:"));
        assert_eq!(
            msgs.last(),
            Some(&OrchMsg::Response(format!(
                "mission aborted: {}",
                FAILED_CYCLES_REASON
            )))
        );
        assert!(f.vehicle.cmds().is_empty());

        // The resources come back for the next mission
        f.controller.reap().unwrap();
        f.controller.start_mission("red ball").unwrap();
        f.controller.stop_mission().unwrap();
    }

    #[test]
    fn test_external_policy_forwards_commands() {
        let mut f = fixture(PolicyKind::External, false);
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        f.controller.handle_raw_command("forward 50");
        recv_until(&f.upstream, |m| detection_cmd(m) == Some("forward 50"));

        f.controller.handle_raw_command("fly away");
        recv_until(&f.upstream, |m| is_response(m, "invalid command \"fly away\""));

        f.controller.stop_mission().unwrap();
        assert_eq!(f.vehicle.cmds(), vec!["forward 50"]);
    }

    #[test]
    fn test_raw_command_routing() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);

        // Idle, passed through as is
        f.controller.handle_raw_command("battery?");
        assert_eq!(f.vehicle.cmds(), vec!["battery?"]);

        // Rejected while the PID policy drives the vehicle
        f.controller.start_mission("red ball").unwrap();
        f.controller.handle_raw_command("up 50");
        recv_until(&f.upstream, |m| is_response(m, "command rejected"));

        f.controller.stop_mission().unwrap();
        assert!(!f.vehicle.cmds().contains(&String::from("up 50")));
    }

    #[test]
    fn test_cancel_during_capture_sends_nothing() {
        let (entered_tx, entered) = channel();
        let target = Arc::new(Mutex::new(Some(LANDING_BOX)));
        let mut f = fixture_with(
            mission_params(PolicyKind::Pid),
            MissionResources {
                frames: Box::new(StallingFrames(Stall::new(entered_tx))),
                detector: Box::new(MockDetector {
                    target: target.clone(),
                }),
            },
            target,
        );
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        entered.recv_timeout(TIMEOUT).unwrap();
        f.controller.stop_mission().unwrap();

        // The frame arrives after the stop, so the box in it is never acted on
        let msgs: Vec<OrchMsg> = f.upstream.try_iter().collect();
        assert_eq!(
            msgs,
            vec![OrchMsg::Response(format!(
                "mission aborted: {}",
                CANCELLED_REASON
            ))]
        );
        assert!(f.vehicle.cmds().is_empty());
        assert_eq!(f.controller.state(), MissionState::Idle);
    }

    #[test]
    fn test_cancel_during_detection_sends_nothing() {
        let (entered_tx, entered) = channel();
        let mut f = fixture_with(
            mission_params(PolicyKind::Pid),
            MissionResources {
                frames: Box::new(MockFrames { fail: false }),
                detector: Box::new(StallingDetector(Stall::new(entered_tx))),
            },
            Arc::new(Mutex::new(None)),
        );
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        entered.recv_timeout(TIMEOUT).unwrap();
        f.controller.stop_mission().unwrap();

        // The detector returns a landing-sized box, but no land is sent
        let msgs: Vec<OrchMsg> = f.upstream.try_iter().collect();
        assert_eq!(
            msgs,
            vec![OrchMsg::Response(format!(
                "mission aborted: {}",
                CANCELLED_REASON
            ))]
        );
        assert!(f.vehicle.cmds().is_empty());
    }

    #[test]
    fn test_state_known_when_start_returns() {
        // Airborne, searching
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);
        f.controller.start_mission("red ball").unwrap();
        assert_eq!(f.controller.state(), MissionState::Active);
        f.controller.stop_mission().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);

        // No telemetry, settling after takeoff
        let mut params = mission_params(PolicyKind::Pid);
        params.takeoff_settle_s = 10.0;
        let target = Arc::new(Mutex::new(None));
        let mut f = fixture_with(
            params,
            MissionResources {
                frames: Box::new(MockFrames { fail: false }),
                detector: Box::new(MockDetector {
                    target: target.clone(),
                }),
            },
            target,
        );
        f.controller.start_mission("red ball").unwrap();
        assert_eq!(f.controller.state(), MissionState::TakingOff);
        f.controller.stop_mission().unwrap();
        assert_eq!(f.controller.state(), MissionState::Idle);
        assert_eq!(f.vehicle.cmds(), vec!["takeoff"]);
    }

    #[test]
    fn test_ended_mission_reads_idle_before_reap() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);
        *f.target.lock().unwrap() = Some(LANDING_BOX);

        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));

        let start = Instant::now();
        while f.controller.state() != MissionState::Idle {
            assert!(start.elapsed() < TIMEOUT, "Mission never returned to Idle");
            std::thread::sleep(Duration::from_millis(5));
        }

        // The next mission starts without an explicit reap
        f.controller.start_mission("blue box").unwrap();
        recv_until(&f.upstream, |m| matches!(m, OrchMsg::Complete(_)));
        f.controller.stop_mission().unwrap();
        assert_eq!(f.vehicle.cmds(), vec!["land", "land"]);
    }

    #[test]
    fn test_arm_session_waits_for_mission_to_end() {
        let mut f = fixture(PolicyKind::Pid, false);
        set_height(&f.telem, 100);

        // Idle, armed straight away
        f.controller.arm_session();
        assert_eq!(f.vehicle.cmds(), vec!["command", "streamon"]);

        // Nothing in view, the mission searches until stopped
        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| detection_cmd(m) == Some("cw 30"));

        f.controller.arm_session();
        let cmds = f.vehicle.cmds();
        assert!(cmds[2..].iter().all(|c| c == "cw 30"));

        // Armed again once the loop has exited
        f.controller.stop_mission().unwrap();
        let cmds = f.vehicle.cmds();
        let n = cmds.len();
        assert_eq!(cmds[n - 2..], ["command", "streamon"]);
        assert!(cmds[2..n - 2].iter().all(|c| c == "cw 30"));

        // Only once
        f.controller.reap().unwrap();
        assert_eq!(f.vehicle.cmds().len(), n);
    }

    #[test]
    fn test_huge_cycle_period_is_stoppable() {
        let mut params = mission_params(PolicyKind::Pid);
        params.cycle_period_s = 1e20;
        let target = Arc::new(Mutex::new(None));
        let mut f = fixture_with(
            params,
            MissionResources {
                frames: Box::new(MockFrames { fail: false }),
                detector: Box::new(MockDetector {
                    target: target.clone(),
                }),
            },
            target,
        );
        set_height(&f.telem, 100);

        f.controller.start_mission("red ball").unwrap();
        recv_until(&f.upstream, |m| detection_cmd(m) == Some("cw 30"));
        f.controller.stop_mission().unwrap();

        // The loop exited cleanly, so the resources are back
        f.controller.start_mission("red ball").unwrap();
        f.controller.stop_mission().unwrap();
    }

    #[test]
    fn test_summary_serialises() {
        let summary = MissionSummary {
            number: 2,
            target: String::from("red ball"),
            cycle_count: 5,
            outcome: MissionOutcome::Aborted(String::from(CANCELLED_REASON)),
            start_time: Utc::now(),
            end_time: Utc::now(),
            commands: vec![String::from("takeoff"), String::from("cw 30")],
        };

        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["outcome"]["result"], "aborted");
        assert_eq!(v["outcome"]["reason"], "cancelled");
        assert_eq!(v["commands"][1], "cw 30");

        let v = serde_json::to_value(&MissionOutcome::Complete).unwrap();
        assert_eq!(v["result"], "complete");
    }
}
