//! Main navigation executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logger and parameters
//!     - Initialise the network:
//!         - Vehicle client (commands, acknowledgements, telemetry)
//!         - Orchestrator client
//!         - Detector client and frame client
//!     - Arm the vehicle session through the mission controller
//!     - Main loop:
//!         - Orchestrator event handling:
//!             - (Re)connection re-arms the vehicle session
//!             - Mission start/stop and raw commands go to the mission controller
//!         - Collection of missions which have ended
//!
//! Missions themselves run on their own thread owned by the `MissionController`.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::net::NetParams;
use nav_lib::{
    detect_client::DetectClient,
    frame_client::FfmpegFrameClient,
    mission::{MissionController, MissionResources},
    nav_ctrl::NavCtrlParams,
    orch_client::{OrchClient, OrchEvent},
    params::NavExecParams,
    telem_store::TelemStore,
    vehicle_client::VehicleClient,
};

mod msg_processor;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{error, info, warn};
use std::{
    sync::{mpsc::RecvTimeoutError, Arc},
    time::Duration,
};

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest time the main loop waits for an orchestrator event before checking on the mission.
const EVENT_WAIT_PERIOD: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("nav_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Drone Navigation Executable\n");
    info!("Running on: {}", host::get_host_description());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: NavExecParams =
        util::params::load("nav_exec.toml").wrap_err("Could not load exec params")?;
    let nav_ctrl_params: NavCtrlParams =
        util::params::load("nav_ctrl.toml").wrap_err("Could not load NavCtrl params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let (orch_client, orch_events) = OrchClient::new(&zmq_ctx, &net_params)
        .wrap_err("Failed to initialise the OrchClient")?;
    let upstream = orch_client.sender();
    info!("OrchClient initialised");

    let telem_store = Arc::new(TelemStore::new());

    let vehicle_client = Arc::new(
        VehicleClient::new(&exec_params.vehicle, telem_store.clone(), upstream.clone())
            .wrap_err("Failed to initialise the VehicleClient")?,
    );
    info!("VehicleClient initialised");

    let detect_client = DetectClient::new(&zmq_ctx, &net_params)
        .wrap_err("Failed to initialise the DetectClient")?;
    info!("DetectClient initialised");

    let frame_client = FfmpegFrameClient::new(&exec_params.vehicle, &exec_params.capture);

    info!("Network initialisation complete");

    // ---- INITIALISE MISSION CONTROLLER ----

    let mut controller = MissionController::new(
        exec_params.mission.clone(),
        nav_ctrl_params,
        telem_store,
        vehicle_client,
        upstream.clone(),
        MissionResources {
            frames: Box::new(frame_client),
            detector: Box::new(detect_client),
        },
    )
    .with_session(session.clone());

    controller.arm_session();

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        match orch_events.recv_timeout(EVENT_WAIT_PERIOD) {
            Ok(OrchEvent::Connected) => controller.arm_session(),
            Ok(OrchEvent::Disconnected) => {
                warn!("Orchestrator disconnected, reports will be dropped until it reconnects")
            }
            Ok(OrchEvent::Msg(msg)) => msg_processor::exec(&mut controller, &upstream, msg),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                error!("Orchestrator link thread has stopped");
                break;
            }
        }

        if let Err(e) = controller.reap() {
            warn!("{}", e);
        }
    }

    // ---- SHUTDOWN ----

    if let Err(e) = controller.shutdown() {
        warn!("Error stopping the mission: {}", e);
    }
    drop(controller);
    drop(orch_client);

    session.exit();

    info!("End of execution");

    Ok(())
}
