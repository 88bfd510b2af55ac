//! Placement daemon - runs in background keeping windows where the profile says

mod ipc_handler;

pub use ipc_handler::spawn_ipc_listener;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{Config, Profile};
use crate::constants::daemon::COMMAND_POLL_MS;
use crate::engine::{ContinuousRunner, PlacementEngine};
use crate::ipc::{default_socket_path, EngineServer};
use crate::platform::procfs::ProcfsDirectory;
use crate::platform::x11::X11WindowSystem;

/// Summary of a completed reload, reported back to the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub profile: String,
    pub rules: usize,
    pub generation: u64,
}

/// Work the IPC thread hands to the main loop
pub enum DaemonCommand {
    Reload {
        profile: Option<String>,
        reply: mpsc::Sender<Result<ReloadSummary>>,
    },
    Shutdown,
}

/// Owns the engine's worker and the settings it was started from
pub struct Daemon {
    engine: Arc<PlacementEngine>,
    runner: ContinuousRunner,
    config_path: PathBuf,
    /// Profile named on the command line or in the last reload request
    pinned_profile: Option<String>,
    interval: Duration,
}

impl Daemon {
    pub fn start(engine: Arc<PlacementEngine>, config_path: PathBuf, pinned_profile: Option<String>, interval: Duration) -> Result<Self> {
        let runner = engine.run_continuous(interval)?;
        Ok(Self {
            engine,
            runner,
            config_path,
            pinned_profile,
            interval,
        })
    }

    pub fn engine(&self) -> &Arc<PlacementEngine> {
        &self.engine
    }

    /// Re-read the settings file and swap in the resolved profile.
    ///
    /// On any error the current profile stays active.
    pub fn reload(&mut self, profile: Option<String>) -> Result<ReloadSummary> {
        let config = Config::load_from(&self.config_path)
            .context("Failed to reload config")?;
        let wanted = profile.or_else(|| self.pinned_profile.clone());
        let resolved = config
            .active_profile(wanted.as_deref())
            .context("Failed to resolve profile")?;

        if wanted.is_some() {
            self.pinned_profile = wanted;
        }

        let name = resolved.name.clone();
        let rules = resolved.windows.len();
        let generation = self.engine.reload(resolved);

        let interval = Duration::from_millis(config.global.poll_interval_ms);
        if interval != self.interval {
            info!(from_ms = self.interval.as_millis() as u64, to_ms = interval.as_millis() as u64, "Poll interval changed, restarting worker");
            self.restart_runner(interval)?;
        }

        Ok(ReloadSummary {
            profile: name,
            rules,
            generation,
        })
    }

    fn restart_runner(&mut self, interval: Duration) -> Result<()> {
        if !self.runner.stop() {
            warn!("Previous worker still busy, starting replacement anyway");
        }
        self.runner = self.engine.run_continuous(interval)?;
        self.interval = interval;
        Ok(())
    }

    /// Process one queued command. Returns false when the daemon should exit.
    pub fn handle_command(&mut self, command: DaemonCommand) -> bool {
        match command {
            DaemonCommand::Reload { profile, reply } => {
                let result = self.reload(profile);
                match &result {
                    Ok(summary) => info!(profile = %summary.profile, rules = summary.rules, generation = summary.generation, "Reloaded via IPC"),
                    Err(e) => error!(error = ?e, "Reload failed, keeping current profile"),
                }
                if reply.send(result).is_err() {
                    warn!("Reload requester went away before the reply");
                }
                true
            }
            DaemonCommand::Shutdown => {
                info!("Received shutdown request");
                false
            }
        }
    }

    pub fn stop(mut self) {
        self.runner.stop();
    }
}

/// Flags set from signal handlers
struct SignalFlags {
    terminate: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl SignalFlags {
    fn register() -> Result<Self> {
        use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

        let terminate = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&terminate))
            .context("Failed to register SIGINT handler")?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&terminate))
            .context("Failed to register SIGTERM handler")?;
        signal_hook::flag::register(SIGHUP, Arc::clone(&reload))
            .context("Failed to register SIGHUP handler")?;
        Ok(Self { terminate, reload })
    }
}

pub fn run_daemon(profile_override: Option<String>) -> Result<()> {
    let windows = Arc::new(X11WindowSystem::connect()
        .context("Failed to connect to X11 server. Is DISPLAY set correctly?")?);
    let processes = Arc::new(ProcfsDirectory::new());

    let config_path = Config::path();
    let config = Config::load_from(&config_path)
        .context("Failed to load config")?;
    let profile: Profile = config.active_profile(profile_override.as_deref())?;
    info!(profile = %profile.name, rules = profile.windows.len(), poll_interval_ms = config.global.poll_interval_ms, "Loaded active profile");

    let engine = Arc::new(PlacementEngine::new(windows, processes, profile));
    let mut daemon = Daemon::start(
        engine,
        config_path,
        profile_override,
        Duration::from_millis(config.global.poll_interval_ms),
    )?;

    let signals = SignalFlags::register()?;

    let (cmd_tx, cmd_rx) = mpsc::channel::<DaemonCommand>();
    let server = EngineServer::bind_to(default_socket_path()?).context("Failed to start IPC server")?;
    let socket_path = server.path().to_path_buf();
    let _ipc_handle = spawn_ipc_listener(server, Arc::clone(daemon.engine()), cmd_tx)?;

    info!(socket = %socket_path.display(), "Placement daemon running");

    let mut commands_open = true;
    loop {
        if signals.terminate.load(Ordering::SeqCst) {
            info!("Termination signal received");
            break;
        }

        if signals.reload.swap(false, Ordering::SeqCst) {
            info!("SIGHUP received, reloading config");
            match daemon.reload(None) {
                Ok(summary) => info!(profile = %summary.profile, rules = summary.rules, generation = summary.generation, "Reloaded via signal"),
                Err(e) => error!(error = ?e, "Reload failed, keeping current profile"),
            }
        }

        if !commands_open {
            std::thread::sleep(Duration::from_millis(COMMAND_POLL_MS));
            continue;
        }

        match cmd_rx.recv_timeout(Duration::from_millis(COMMAND_POLL_MS)) {
            Ok(command) => {
                if !daemon.handle_command(command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("IPC listener exited, continuing without remote control");
                commands_open = false;
            }
        }
    }

    daemon.stop();
    // The listener thread is parked in accept(); remove the socket ourselves
    let _ = std::fs::remove_file(&socket_path);
    info!("Placement daemon stopped");
    Ok(())
}
