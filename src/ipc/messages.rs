//! IPC message types for CLI ↔ daemon communication

use serde::{Deserialize, Serialize};

use crate::engine::{ActivationOutcome, EngineStatus, PlacementOutcome};

/// Requests sent from a client to the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum EngineRequest {
    /// Re-read the settings file and switch to `profile` (or the selected one)
    Reload { profile: Option<String> },

    /// One-shot placement of a profile, ignoring session history
    TestLayout { profile: Option<String> },

    /// Foreground running windows and/or launch missing programs
    ActivateOrLaunch {
        profile: Option<String>,
        launch_if_absent: bool,
        foreground_if_running: bool,
    },

    Status,

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Responses sent from the daemon to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    Reloaded { profile: String, rules: usize, generation: u64 },

    Placements(Vec<PlacementOutcome>),

    Activations(Vec<ActivationOutcome>),

    Status(EngineStatus),

    /// Health check response
    Pong,

    /// Acknowledgment that request was processed
    Ready,

    /// Error occurred
    Error(String),
}
