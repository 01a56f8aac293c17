//! # Orchestrator message module
//!
//! This module provides the messages exchanged between the navigation executable and the mission
//! orchestrator. Every message is a JSON object with a `type` tag and, for most kinds, a
//! `payload`:
//!
//! ```json
//! {"type": "start-mission", "payload": "red ball"}
//! {"type": "stop-mission"}
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::eqpt::{detect::Detection, telem::VehicleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-cycle report sent to the orchestrator while a mission runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    #[serde(flatten)]
    pub detection: Detection,

    /// The command sent to the vehicle this cycle, if any
    pub command: Option<String>,

    /// The most recent fresh telemetry at the time of the decision
    pub telemetry: Option<VehicleState>,

    /// Number of cycles run by the mission so far, including this one
    pub cycle_count: u64,
}

/// Sent once when a mission lands on its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteReport {
    pub cycle_count: u64,
    pub target: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A message to or from the orchestrator.
///
/// `StartMission`, `StopMission` and `Command` are sent by the orchestrator, the rest are sent
/// by the navigation executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum OrchMsg {
    /// Start a mission towards the object with the given label
    StartMission(String),

    /// Stop the running mission, if any
    StopMission,

    /// A raw vehicle command string
    Command(String),

    /// Free text response, e.g. a command acknowledgement or an error
    Response(String),

    Detection(DetectionReport),

    Complete(CompleteReport),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum OrchParseError {
    #[error("Message contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Message has no string \"type\" field")]
    MissingType,

    #[error("Message of type \"{0}\" is invalid: {1}")]
    InvalidMessage(String, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OrchMsg {
    /// Parse a message from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, OrchParseError> {
        let val: serde_json::Value =
            serde_json::from_str(json_str).map_err(OrchParseError::InvalidJson)?;

        let msg_type = match val.get("type").and_then(|t| t.as_str()) {
            Some(t) => String::from(t),
            None => return Err(OrchParseError::MissingType),
        };

        serde_json::from_value(val).map_err(|e| OrchParseError::InvalidMessage(msg_type, e))
    }

    /// Serialise the message into a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// True if the message is one the orchestrator sends to the navigation executable.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            OrchMsg::StartMission(_) | OrchMsg::StopMission | OrchMsg::Command(_)
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
