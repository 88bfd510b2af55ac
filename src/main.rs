#![forbid(unsafe_code)]

mod config;
mod constants;
mod daemon;
mod engine;
mod error;
mod ipc;
mod platform;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{Level as TraceLevel, debug, info};
use tracing_subscriber::FmtSubscriber;

use config::{Config, Profile};
use engine::{ActivationOutcome, ActivationStatus, PlacementEngine, PlacementOutcome, PlacementStatus, WindowMatcher};
use ipc::{EngineClient, EngineRequest, EngineResponse};
use platform::WindowSystem;
use platform::procfs::ProcfsDirectory;
use platform::x11::X11WindowSystem;

/// Keeps application windows at the positions and sizes set in a profile
#[derive(Parser, Debug)]
#[command(name = "window-keeper", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the placement daemon (default)
    Run {
        /// Profile to activate instead of the selected one
        #[arg(long)]
        profile: Option<String>,
    },
    /// Ask the running daemon to re-read its settings
    Reload {
        #[arg(long)]
        profile: Option<String>,
    },
    /// Place every matching window once, ignoring what the daemon already did
    Test {
        #[arg(long)]
        profile: Option<String>,
    },
    /// Bring profile windows to the front, launching missing programs
    Activate {
        #[arg(long)]
        profile: Option<String>,
        /// Do not start programs that are not running
        #[arg(long)]
        no_launch: bool,
        /// Do not foreground programs that are running
        #[arg(long)]
        no_foreground: bool,
    },
    /// Show the daemon's active profile and session
    Status,
    /// Stop the running daemon
    Stop,
    /// List windows matching a process name and optional title hint
    List {
        #[arg(long)]
        process: String,
        #[arg(long, default_value = "")]
        title: String,
    },
}

fn parse_level(name: &str) -> TraceLevel {
    match name.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// Log level from the settings file, if one exists. Never writes a default
/// file: commands like `status` must not leave settings behind.
fn configured_level(path: &Path) -> Option<TraceLevel> {
    if !path.exists() {
        return None;
    }
    Config::load_from(path)
        .ok()
        .map(|c| parse_level(&c.global.log_level))
}

fn init_logging() -> Result<()> {
    // LOG_LEVEL wins over the settings file
    let level = match std::env::var("LOG_LEVEL") {
        Ok(level) => parse_level(&level),
        Err(_) => configured_level(&Config::path()).unwrap_or(TraceLevel::INFO),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    match cli.command.unwrap_or(Commands::Run { profile: None }) {
        Commands::Run { profile } => daemon::run_daemon(profile),
        Commands::Reload { profile } => reload(profile),
        Commands::Test { profile } => test_layout(profile),
        Commands::Activate {
            profile,
            no_launch,
            no_foreground,
        } => activate(profile, !no_launch, !no_foreground),
        Commands::Status => status(),
        Commands::Stop => stop(),
        Commands::List { process, title } => list(&process, &title),
    }
}

/// Send one request to the daemon, or `None` if no daemon is listening
fn try_daemon(request: &EngineRequest) -> Option<Result<EngineResponse>> {
    match EngineClient::connect() {
        Ok(mut client) => Some(client.request(request)),
        Err(e) => {
            debug!(error = ?e, "Daemon not reachable");
            None
        }
    }
}

fn daemon_request(request: &EngineRequest) -> Result<EngineResponse> {
    let mut client = EngineClient::connect().context("Is the window-keeper daemon running?")?;
    client.request(request)
}

/// Engine on the live desktop, for commands run without a daemon
fn local_engine(profile: Profile) -> Result<PlacementEngine> {
    let windows = Arc::new(X11WindowSystem::connect()?);
    let processes = Arc::new(ProcfsDirectory::new());
    Ok(PlacementEngine::new(windows, processes, profile))
}

fn local_profile(name: Option<&str>) -> Result<Profile> {
    Config::load()?.active_profile(name)
}

fn reload(profile: Option<String>) -> Result<()> {
    match daemon_request(&EngineRequest::Reload { profile })? {
        EngineResponse::Reloaded {
            profile,
            rules,
            generation,
        } => {
            println!("Reloaded profile '{profile}' ({rules} rules, session {generation})");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn test_layout(profile: Option<String>) -> Result<()> {
    let outcomes = match try_daemon(&EngineRequest::TestLayout { profile: profile.clone() }) {
        Some(response) => match response? {
            EngineResponse::Placements(outcomes) => outcomes,
            other => return unexpected(other),
        },
        None => {
            info!("No daemon running, testing layout in-process");
            let profile = local_profile(profile.as_deref())?;
            local_engine(profile.clone())?.test_layout(&profile)
        }
    };
    print_placements(&outcomes);
    Ok(())
}

fn activate(profile: Option<String>, launch_if_absent: bool, foreground_if_running: bool) -> Result<()> {
    let request = EngineRequest::ActivateOrLaunch {
        profile: profile.clone(),
        launch_if_absent,
        foreground_if_running,
    };
    let outcomes = match try_daemon(&request) {
        Some(response) => match response? {
            EngineResponse::Activations(outcomes) => outcomes,
            other => return unexpected(other),
        },
        None => {
            info!("No daemon running, activating in-process");
            let profile = local_profile(profile.as_deref())?;
            local_engine(profile.clone())?.activate_or_launch(&profile, launch_if_absent, foreground_if_running)
        }
    };
    print_activations(&outcomes);

    let failed = outcomes.iter().filter(|o| !o.status.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{failed} rule(s) could not be activated or launched");
    }
    Ok(())
}

fn status() -> Result<()> {
    match daemon_request(&EngineRequest::Status)? {
        EngineResponse::Status(status) => {
            println!("Profile:    {}", status.profile);
            println!("Rules:      {} ({} enabled)", status.rules, status.enabled_rules);
            println!("Session:    {}", status.generation);
            println!("Running:    {}", status.running);
            match status.tracked_processes {
                Some(count) => println!("Tracked:    {count} process(es)"),
                None => println!("Tracked:    (pass in progress)"),
            }
            Ok(())
        }
        other => unexpected(other),
    }
}

fn stop() -> Result<()> {
    match daemon_request(&EngineRequest::Shutdown)? {
        EngineResponse::Ready => {
            println!("Daemon stopping");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn list(process: &str, title: &str) -> Result<()> {
    let windows = X11WindowSystem::connect()?;
    let processes = ProcfsDirectory::new();
    let matches = WindowMatcher::new(&windows, &processes)
        .find(process, title)
        .context("Failed to enumerate windows")?;

    if matches.is_empty() {
        println!("No windows match '{process}'");
    }
    for m in matches {
        let rect = windows
            .rect(m.window)
            .map(|r| r.to_string())
            .unwrap_or_else(|e| format!("<{e}>"));
        println!("{:#010x}  pid {:<7} {:<20} {}  {}", m.window, m.pid, m.image_name, rect, m.title);
    }
    Ok(())
}

fn unexpected<T>(response: EngineResponse) -> Result<T> {
    match response {
        EngineResponse::Error(message) => anyhow::bail!("Daemon error: {message}"),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
}

fn print_placements(outcomes: &[PlacementOutcome]) {
    for outcome in outcomes {
        let detail = match &outcome.status {
            PlacementStatus::NoMatch => "no matching window".to_string(),
            PlacementStatus::AlreadyHandled { pid } => format!("already placed (pid {pid})"),
            PlacementStatus::Applied { pid, window, rect } => format!("placed window {window:#x} (pid {pid}) at {rect}"),
            PlacementStatus::InvalidGeometry { pid, width, height } => {
                format!("skipped pid {pid}: size {width}x{height} is not positive")
            }
            PlacementStatus::Failed { reason } => format!("failed: {reason}"),
        };
        println!("[{}] {}: {}", outcome.index, outcome.process_name, detail);
    }
}

fn print_activations(outcomes: &[ActivationOutcome]) {
    for outcome in outcomes {
        let detail = match &outcome.status {
            ActivationStatus::Activated { pid, window } => format!("activated window {window:#x} (pid {pid})"),
            ActivationStatus::ForegroundFailed { pid, window } => {
                format!("could not foreground window {window:#x} (pid {pid})")
            }
            ActivationStatus::AlreadyRunning { pid } => format!("running (pid {pid})"),
            ActivationStatus::Launched { target } => format!("launched {target}"),
            ActivationStatus::LaunchFailed { target, reason } => format!("failed to launch {target}: {reason}"),
            ActivationStatus::NotRunning => "not running".to_string(),
            ActivationStatus::Failed { reason } => format!("failed: {reason}"),
        };
        println!("[{}] {}: {}", outcome.index, outcome.process_name, detail);
    }
}
