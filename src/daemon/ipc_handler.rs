//! IPC request handler for the daemon process

use anyhow::{Context, Result};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{DaemonCommand, ReloadSummary};
use crate::config::{Config, Profile};
use crate::engine::PlacementEngine;
use crate::ipc::{EngineRequest, EngineResponse, EngineServer};

/// Connection handle for a single CLI client
struct ClientConnection {
    stream: UnixStream,
}

impl ClientConnection {
    fn send_response(&mut self, resp: &EngineResponse) -> Result<()> {
        crate::ipc::write_message(&mut self.stream, resp)
    }

    /// Receive request from the client (blocking)
    fn recv_request(&mut self) -> Result<EngineRequest> {
        crate::ipc::read_message(&mut self.stream)
    }
}

/// Spawn IPC listener thread to handle CLI requests
pub fn spawn_ipc_listener(
    server: EngineServer,
    engine: Arc<PlacementEngine>,
    cmd_tx: mpsc::Sender<DaemonCommand>,
) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("ipc-listener".to_string())
        .spawn(move || {
            if let Err(e) = run_ipc_loop(&server, &engine, &cmd_tx) {
                error!(error = ?e, "IPC listener thread crashed");
            }
        })
        .context("Failed to spawn IPC listener thread")
}

fn run_ipc_loop(
    server: &EngineServer,
    engine: &PlacementEngine,
    cmd_tx: &mpsc::Sender<DaemonCommand>,
) -> Result<()> {
    info!(socket = ?server.path(), "IPC listener started");

    loop {
        // Accept connection (blocks until a client connects)
        let mut client = ClientConnection {
            stream: server.accept()?,
        };
        debug!("Client connected");

        // Handle messages from this client
        loop {
            let request = match client.recv_request() {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = ?e, "IPC connection closed");
                    break; // Continue accepting new connections
                }
            };

            let shutting_down = request == EngineRequest::Shutdown;
            let response = handle_request(request, engine, cmd_tx);
            if let Err(e) = client.send_response(&response) {
                warn!(error = ?e, "Failed to send IPC response");
                break;
            }

            if shutting_down {
                return Ok(());
            }
        }
    }
}

/// Answer one request. Reloads and shutdown go through the main loop, which
/// owns the worker; everything else runs directly against the engine.
fn handle_request(
    request: EngineRequest,
    engine: &PlacementEngine,
    cmd_tx: &mpsc::Sender<DaemonCommand>,
) -> EngineResponse {
    match request {
        EngineRequest::Reload { profile } => {
            info!(profile = ?profile, "Received reload request via IPC");
            match request_reload(profile, cmd_tx) {
                Ok(summary) => EngineResponse::Reloaded {
                    profile: summary.profile,
                    rules: summary.rules,
                    generation: summary.generation,
                },
                Err(e) => EngineResponse::Error(format!("{e:#}")),
            }
        }

        EngineRequest::TestLayout { profile } => {
            info!(profile = ?profile, "Received layout test request via IPC");
            match resolve_profile(engine, profile.as_deref()) {
                Ok(profile) => EngineResponse::Placements(engine.test_layout(&profile)),
                Err(e) => EngineResponse::Error(format!("{e:#}")),
            }
        }

        EngineRequest::ActivateOrLaunch {
            profile,
            launch_if_absent,
            foreground_if_running,
        } => {
            info!(profile = ?profile, launch_if_absent, foreground_if_running, "Received activate request via IPC");
            match resolve_profile(engine, profile.as_deref()) {
                Ok(profile) => EngineResponse::Activations(engine.activate_or_launch(
                    &profile,
                    launch_if_absent,
                    foreground_if_running,
                )),
                Err(e) => EngineResponse::Error(format!("{e:#}")),
            }
        }

        EngineRequest::Status => EngineResponse::Status(engine.status()),

        EngineRequest::Ping => EngineResponse::Pong,

        EngineRequest::Shutdown => {
            info!("Received shutdown request via IPC");
            if cmd_tx.send(DaemonCommand::Shutdown).is_err() {
                warn!("Main loop already gone");
            }
            EngineResponse::Ready
        }
    }
}

fn request_reload(profile: Option<String>, cmd_tx: &mpsc::Sender<DaemonCommand>) -> Result<ReloadSummary> {
    let (reply_tx, reply_rx) = mpsc::channel();
    cmd_tx
        .send(DaemonCommand::Reload { profile, reply: reply_tx })
        .context("Daemon main loop is not accepting commands")?;
    reply_rx
        .recv()
        .context("Daemon main loop dropped the reload request")?
}

/// The active profile when no name is given, otherwise the named profile
/// read fresh from the settings file. Never changes the active profile.
fn resolve_profile(engine: &PlacementEngine, name: Option<&str>) -> Result<Profile> {
    match name {
        None => Ok(engine.active_profile()),
        Some(name) => Config::load()?.active_profile(Some(name)),
    }
}
