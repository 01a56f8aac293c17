//! # Mission loop
//!
//! A mission runs on its own thread. After an optional takeoff the loop repeats the
//! capture, detect, decide and send cycle, waiting for the cycle period between the end of one
//! cycle and the start of the next. The cancellation token is checked at the top of every cycle
//! and after each blocking step, and no command is sent once cancellation has been observed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::{mpsc::Sender, Arc};

// Internal
use super::{
    Mission, MissionOutcome, MissionResources, MissionState, MissionStatus, MissionSummary,
};
use crate::{
    detect_client::DetectClientError,
    frame_client::FrameClientError,
    nav_ctrl::{geometry, NavigationPolicy},
    params::MissionParams,
    telem_store::TelemStore,
    vehicle_client::CommandSink,
};
use comms_if::{
    eqpt::drone::DroneCmd,
    orch::{CompleteReport, DetectionReport, OrchMsg},
};
use util::{session::Session, time::secs_to_duration};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Abort reason when the mission was cancelled by its controller.
pub const CANCELLED_REASON: &str = "cancelled";

/// Abort reason when too many cycles failed in a row.
pub const FAILED_CYCLES_REASON: &str = "too many consecutive failed cycles";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a mission loop shares with the rest of the executable.
pub(crate) struct LoopContext {
    pub params: MissionParams,
    pub telem: Arc<TelemStore>,
    pub vehicle: Arc<dyn CommandSink>,
    pub upstream: Sender<OrchMsg>,
    pub status: MissionStatus,
    pub session: Option<Session>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Ways in which a single cycle can fail.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("The mission was cancelled")]
    Cancelled,

    #[error("Frame capture failed: {0}")]
    Capture(FrameClientError),

    #[error("Detection failed: {0}")]
    Detect(DetectClientError),
}

enum CycleOutcome {
    Continue,
    Landing,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// State a mission starts in: `TakingOff` unless fresh telemetry puts the vehicle at or above the
/// takeoff threshold.
pub(crate) fn initial_state(params: &MissionParams, telem: &TelemStore) -> MissionState {
    match telem.latest_fresh(secs_to_duration(params.telem_stale_s)) {
        Some(s) if s.height_cm >= params.takeoff_height_threshold_cm => MissionState::Active,
        _ => MissionState::TakingOff,
    }
}

/// Run a mission to completion or abort, handing the resources back at the end.
pub(crate) fn run_mission(
    ctx: LoopContext,
    mut mission: Mission,
    initial: MissionState,
    mut resources: MissionResources,
    mut policy: Box<dyn NavigationPolicy>,
) -> MissionResources {
    let start_time = Utc::now();
    let mut commands = Vec::new();

    info!(
        "Mission {} towards \"{}\" started with the {} policy",
        mission.number,
        mission.target_label,
        policy.name()
    );

    let outcome = run_loop(
        &ctx,
        &mut mission,
        initial,
        &mut resources,
        policy.as_mut(),
        &mut commands,
    );

    policy.reset();

    match outcome {
        MissionOutcome::Complete => {
            ctx.status.set(MissionState::Complete);
            info!(
                "Mission {} complete after {} cycles",
                mission.number, mission.cycle_count
            );
            report(
                &ctx,
                OrchMsg::Complete(CompleteReport {
                    cycle_count: mission.cycle_count,
                    target: mission.target_label.clone(),
                }),
            );
        }
        MissionOutcome::Aborted(ref reason) => {
            ctx.status.set(MissionState::Aborted);
            warn!("Mission {} aborted: {}", mission.number, reason);
            report(&ctx, OrchMsg::Response(format!("mission aborted: {}", reason)));
        }
    }

    if let Some(ref session) = ctx.session {
        session.save(
            format!("arch/mission_{}.json", mission.number),
            MissionSummary {
                number: mission.number,
                target: mission.target_label.clone(),
                cycle_count: mission.cycle_count,
                outcome,
                start_time,
                end_time: Utc::now(),
                commands,
            },
        );
    }

    ctx.status.set(MissionState::Idle);

    resources
}

fn run_loop(
    ctx: &LoopContext,
    mission: &mut Mission,
    initial: MissionState,
    resources: &mut MissionResources,
    policy: &mut dyn NavigationPolicy,
    commands: &mut Vec<String>,
) -> MissionOutcome {
    // ---- TAKEOFF ----

    if initial == MissionState::TakingOff {
        ctx.status.set(MissionState::TakingOff);
        send_cmd(ctx, &DroneCmd::Takeoff, commands);

        if mission
            .cancel
            .wait_timeout(secs_to_duration(ctx.params.takeoff_settle_s))
        {
            return MissionOutcome::Aborted(String::from(CANCELLED_REASON));
        }
    }

    // ---- ACTIVE ----

    ctx.status.set(MissionState::Active);

    let cycle_period = secs_to_duration(ctx.params.cycle_period_s);
    let mut num_consec_failed_cycles = 0u32;

    loop {
        if mission.cancel.is_cancelled() {
            return MissionOutcome::Aborted(String::from(CANCELLED_REASON));
        }

        match run_cycle(ctx, mission, resources, policy, commands) {
            Ok(CycleOutcome::Landing) => return MissionOutcome::Complete,
            Ok(CycleOutcome::Continue) => num_consec_failed_cycles = 0,
            Err(CycleError::Cancelled) => {
                return MissionOutcome::Aborted(String::from(CANCELLED_REASON))
            }
            Err(e) => {
                num_consec_failed_cycles += 1;
                warn!(
                    "Cycle {} failed ({} in a row): {}",
                    mission.cycle_count, num_consec_failed_cycles, e
                );

                if num_consec_failed_cycles >= ctx.params.max_consec_failed_cycles {
                    error!(
                        "Maximum number of consecutive failed cycles ({}) reached",
                        ctx.params.max_consec_failed_cycles
                    );
                    return MissionOutcome::Aborted(String::from(FAILED_CYCLES_REASON));
                }
            }
        }

        if mission.cancel.wait_timeout(cycle_period) {
            return MissionOutcome::Aborted(String::from(CANCELLED_REASON));
        }
    }
}

fn run_cycle(
    ctx: &LoopContext,
    mission: &mut Mission,
    resources: &mut MissionResources,
    policy: &mut dyn NavigationPolicy,
    commands: &mut Vec<String>,
) -> Result<CycleOutcome, CycleError> {
    mission.cycle_count += 1;

    // ---- CAPTURE ----

    let frame = resources.frames.capture().map_err(CycleError::Capture)?;
    if mission.cancel.is_cancelled() {
        return Err(CycleError::Cancelled);
    }

    // ---- DETECT ----

    let norm_box = resources
        .detector
        .detect(&frame.data, &mission.target_label)
        .map_err(CycleError::Detect)?;
    if mission.cancel.is_cancelled() {
        return Err(CycleError::Cancelled);
    }

    let detection = geometry::detection_from_norm(
        ctx.params.frame_width,
        ctx.params.frame_height,
        norm_box,
    );

    debug!(
        "Cycle {}: box {:?}, coverage {}%",
        mission.cycle_count, detection.object_box, detection.coverage_percent
    );

    // ---- DECIDE ----

    let state = ctx
        .telem
        .latest_fresh(secs_to_duration(ctx.params.telem_stale_s));
    let cmd = policy.decide(&detection, state.as_ref());

    if let Some(ref c) = cmd {
        info!("Cycle {}: {}", mission.cycle_count, c);
        if *c == DroneCmd::Land {
            ctx.status.set(MissionState::Landing);
        }
        send_cmd(ctx, c, commands);
    }

    report(
        ctx,
        OrchMsg::Detection(DetectionReport {
            detection,
            command: cmd.as_ref().map(|c| c.to_string()),
            telemetry: state,
            cycle_count: mission.cycle_count,
        }),
    );

    match cmd {
        Some(DroneCmd::Land) => Ok(CycleOutcome::Landing),
        _ => Ok(CycleOutcome::Continue),
    }
}

/// Send a command, failures are logged and not retried.
fn send_cmd(ctx: &LoopContext, cmd: &DroneCmd, commands: &mut Vec<String>) {
    let cmd_str = cmd.to_string();

    if let Err(e) = ctx.vehicle.send_cmd(&cmd_str) {
        warn!("{}", e);
    }

    commands.push(cmd_str);
}

fn report(ctx: &LoopContext, msg: OrchMsg) {
    if ctx.upstream.send(msg).is_err() {
        debug!("Upstream channel closed, report dropped");
    }
}
