//! # Orchestrator message processor module
//!
//! The message processor handles the messages coming from the orchestrator.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use std::sync::mpsc::Sender;

// Internal
use comms_if::orch::OrchMsg;
use nav_lib::mission::MissionController;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a message from the orchestrator.
///
/// Failures are reported back on `upstream`.
pub(crate) fn exec(controller: &mut MissionController, upstream: &Sender<OrchMsg>, msg: OrchMsg) {
    match msg {
        OrchMsg::StartMission(label) => {
            info!("Recieved StartMission towards \"{}\"", label);
            if let Err(e) = controller.start_mission(&label) {
                warn!("Could not start the mission: {}", e);
                upstream
                    .send(OrchMsg::Response(format!("could not start mission: {}", e)))
                    .ok();
            }
        }
        OrchMsg::StopMission => {
            info!("Recieved StopMission");
            if let Err(e) = controller.stop_mission() {
                warn!("Error while stopping the mission: {}", e);
            }
        }
        OrchMsg::Command(raw) => {
            info!("Recieved raw command \"{}\"", raw);
            controller.handle_raw_command(&raw);
        }
        m => warn!("Ignoring outbound-only message {:?}", m),
    }
}
