//! Window placement engine
//!
//! Walks the active profile's rules, matches each against live windows and
//! applies target geometry. Three entry points share the same matcher and
//! applier:
//! - `tick`: one continuous-session pass, remembering handled processes until
//!   the next reload
//! - `test_layout`: one pass against a throwaway state, so every matching
//!   process is repositioned regardless of session history
//! - `activate_or_launch`: foreground matched windows or start missing ones
//!
//! All three take the same OS guard so two passes never move windows at once.

mod applier;
mod matcher;
mod runner;
mod state;

pub use applier::PlacementApplier;
pub use matcher::WindowMatcher;
pub use runner::ContinuousRunner;
pub use state::{ConfigIndex, ProcessPlacementState};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::{Profile, WindowConfig};
use crate::error::PlacementError;
use crate::platform::{ProcessDirectory, WindowSystem};
use crate::types::{ProcessId, Rect, WindowHandle};

/// Result of one rule during a placement pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementStatus {
    /// Nothing matched (or the match vanished mid-pass)
    NoMatch,
    /// Process was already positioned this session and is still alive
    AlreadyHandled { pid: ProcessId },
    Applied { pid: ProcessId, window: WindowHandle, rect: Rect },
    /// Effective size not positive; retried next pass
    InvalidGeometry { pid: ProcessId, width: i32, height: i32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOutcome {
    pub index: ConfigIndex,
    pub process_name: String,
    pub status: PlacementStatus,
}

/// Result of one rule during activate-or-launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationStatus {
    Activated { pid: ProcessId, window: WindowHandle },
    ForegroundFailed { pid: ProcessId, window: WindowHandle },
    /// Running, but foregrounding was not requested
    AlreadyRunning { pid: ProcessId },
    Launched { target: String },
    LaunchFailed { target: String, reason: String },
    /// Not running, and launching was not requested
    NotRunning,
    Failed { reason: String },
}

impl ActivationStatus {
    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            Self::Activated { .. } | Self::AlreadyRunning { .. } | Self::Launched { .. } | Self::NotRunning
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub index: ConfigIndex,
    pub process_name: String,
    pub status: ActivationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub profile: String,
    pub rules: usize,
    pub enabled_rules: usize,
    pub generation: u64,
    pub running: bool,
    /// `None` while a pass holds the session state
    pub tracked_processes: Option<usize>,
}

/// Immutable snapshot handed to each pass
#[derive(Debug)]
struct ActiveLayout {
    profile: Profile,
    generation: u64,
}

pub struct PlacementEngine {
    windows: Arc<dyn WindowSystem>,
    processes: Arc<dyn ProcessDirectory>,
    /// Swapped wholesale on reload; passes clone the Arc and never see a partial update
    layout: RwLock<Arc<ActiveLayout>>,
    session: Mutex<ProcessPlacementState>,
    /// Held for the duration of any pass that issues OS calls
    os_guard: Mutex<()>,
    next_generation: AtomicU64,
    /// Id of the runner currently ticking, 0 when none
    active_runner: AtomicU64,
    next_runner: AtomicU64,
}

impl PlacementEngine {
    pub fn new(windows: Arc<dyn WindowSystem>, processes: Arc<dyn ProcessDirectory>, profile: Profile) -> Self {
        info!(profile = %profile.name, rules = profile.windows.len(), "Placement engine created");
        Self {
            windows,
            processes,
            layout: RwLock::new(Arc::new(ActiveLayout { profile, generation: 0 })),
            session: Mutex::new(ProcessPlacementState::new(0)),
            os_guard: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            active_runner: AtomicU64::new(0),
            next_runner: AtomicU64::new(1),
        }
    }

    /// Replace the active profile and start a new session.
    ///
    /// Never waits for an in-flight pass: the session state is cleared lazily
    /// by the next tick, which notices the generation change.
    pub fn reload(&self, profile: Profile) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        info!(profile = %profile.name, rules = profile.windows.len(), generation = generation, "Reloading active profile");
        *self.layout.write() = Arc::new(ActiveLayout { profile, generation });
        generation
    }

    pub fn active_profile(&self) -> Profile {
        self.snapshot().profile.clone()
    }

    fn snapshot(&self) -> Arc<ActiveLayout> {
        Arc::clone(&self.layout.read())
    }

    pub fn status(&self) -> EngineStatus {
        let layout = self.snapshot();
        EngineStatus {
            profile: layout.profile.name.clone(),
            rules: layout.profile.windows.len(),
            enabled_rules: layout.profile.windows.iter().filter(|w| w.enabled).count(),
            generation: layout.generation,
            running: self.is_running(),
            tracked_processes: self.session.try_lock().map(|s| {
                if s.generation() == layout.generation { s.tracked() } else { 0 }
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active_runner.load(Ordering::SeqCst) != 0
    }

    /// Register a new runner as the current one and return its id
    pub(crate) fn begin_run(&self) -> u64 {
        let id = self.next_runner.fetch_add(1, Ordering::SeqCst);
        self.active_runner.store(id, Ordering::SeqCst);
        id
    }

    /// Clear the running flag, unless a newer runner has taken over since
    /// `id` was started. Returns whether `id` was still current.
    pub(crate) fn end_run(&self, id: u64) -> bool {
        self.active_runner
            .compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Start ticking on a dedicated worker thread
    pub fn run_continuous(self: &Arc<Self>, interval: std::time::Duration) -> anyhow::Result<ContinuousRunner> {
        ContinuousRunner::start(Arc::clone(self), interval)
    }

    /// One continuous-session pass. Returns `None` without touching any window
    /// when another pass is still in progress.
    pub fn tick(&self) -> Option<Vec<PlacementOutcome>> {
        let Some(_guard) = self.os_guard.try_lock() else {
            debug!("Previous pass still running, skipping tick");
            return None;
        };

        let layout = self.snapshot();
        let mut session = self.session.lock();
        if session.generation() != layout.generation {
            debug!(from = session.generation(), to = layout.generation, "New session, clearing placement state");
            session.reset(layout.generation);
        }
        session.reap(&*self.processes);

        Some(self.run_pass(&layout.profile, &mut session))
    }

    /// Apply `profile` once to every matching process, ignoring what the
    /// continuous session has already handled.
    pub fn test_layout(&self, profile: &Profile) -> Vec<PlacementOutcome> {
        let _guard = self.os_guard.lock();
        info!(profile = %profile.name, rules = profile.windows.len(), "Running one-shot layout test");
        let mut scratch = ProcessPlacementState::default();
        self.run_pass(profile, &mut scratch)
    }

    /// For each enabled rule: bring a matched window to the front (when
    /// `foreground_if_running`), or start the program (when `launch_if_absent`).
    pub fn activate_or_launch(&self, profile: &Profile, launch_if_absent: bool, foreground_if_running: bool) -> Vec<ActivationOutcome> {
        let _guard = self.os_guard.lock();
        info!(profile = %profile.name, launch_if_absent, foreground_if_running, "Activating or launching profile windows");
        let matcher = WindowMatcher::new(&*self.windows, &*self.processes);

        enabled_rules(profile)
            .map(|(index, config)| ActivationOutcome {
                index,
                process_name: config.process_name.clone(),
                status: self.activate_one(&matcher, config, launch_if_absent, foreground_if_running),
            })
            .collect()
    }

    fn run_pass(&self, profile: &Profile, state: &mut ProcessPlacementState) -> Vec<PlacementOutcome> {
        let matcher = WindowMatcher::new(&*self.windows, &*self.processes);
        let applier = PlacementApplier::new(&*self.windows);

        enabled_rules(profile)
            .map(|(index, config)| PlacementOutcome {
                index,
                process_name: config.process_name.clone(),
                status: self.place_one(&matcher, &applier, index, config, state),
            })
            .collect()
    }

    fn place_one(
        &self,
        matcher: &WindowMatcher<'_>,
        applier: &PlacementApplier<'_>,
        index: ConfigIndex,
        config: &WindowConfig,
        state: &mut ProcessPlacementState,
    ) -> PlacementStatus {
        let matched = match matcher.find_best(config) {
            Ok(matched) => matched,
            Err(e) => return failure(config, e),
        };

        // One placement per process per session, whichever rule got there first
        if state.is_handled_and_alive(matched.pid, &*self.processes) {
            if let Some(owner) = state.handled_by(matched.pid)
                && owner != index
            {
                trace!(pid = matched.pid, rule = index, placed_by = owner, "Process already placed by another rule");
            }
            return PlacementStatus::AlreadyHandled { pid: matched.pid };
        }
        state.observe(matched.pid);

        match applier.apply(&matched, config) {
            Ok(rect) => {
                state.mark_handled(matched.pid, index);
                PlacementStatus::Applied {
                    pid: matched.pid,
                    window: matched.window,
                    rect,
                }
            }
            Err(PlacementError::InvalidGeometry { width, height }) => {
                if state.note_invalid_geometry(matched.pid, index) {
                    warn!(pid = matched.pid, process = %config.process_name, width, height, "Skipping rule with non-positive size");
                } else {
                    debug!(pid = matched.pid, process = %config.process_name, width, height, "Still skipping rule with non-positive size");
                }
                PlacementStatus::InvalidGeometry {
                    pid: matched.pid,
                    width,
                    height,
                }
            }
            Err(e) => failure(config, e),
        }
    }

    fn activate_one(
        &self,
        matcher: &WindowMatcher<'_>,
        config: &WindowConfig,
        launch_if_absent: bool,
        foreground_if_running: bool,
    ) -> ActivationStatus {
        match matcher.find_best(config) {
            Ok(matched) if foreground_if_running => {
                self.windows.restore_if_minimized(matched.window);
                if self.windows.set_foreground(matched.window) {
                    info!(window = matched.window, pid = matched.pid, process = %matched.image_name, "Activated window");
                    ActivationStatus::Activated {
                        pid: matched.pid,
                        window: matched.window,
                    }
                } else {
                    warn!(window = matched.window, pid = matched.pid, process = %matched.image_name, "Failed to activate window");
                    ActivationStatus::ForegroundFailed {
                        pid: matched.pid,
                        window: matched.window,
                    }
                }
            }
            Ok(matched) => ActivationStatus::AlreadyRunning { pid: matched.pid },
            Err(e) if e.is_expected() && launch_if_absent => {
                let target = config.launch_target().to_string();
                match self.processes.start(&target, &config.launch_args, config.launch_elevated) {
                    Ok(()) => ActivationStatus::Launched { target },
                    Err(e) => {
                        warn!(process = %config.process_name, target = %target, error = %e, "Failed to launch");
                        ActivationStatus::LaunchFailed {
                            target,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Err(e) if e.is_expected() => ActivationStatus::NotRunning,
            Err(e) => {
                warn!(process = %config.process_name, error = %e, "Failed to look up windows");
                ActivationStatus::Failed { reason: e.to_string() }
            }
        }
    }
}

fn enabled_rules(profile: &Profile) -> impl Iterator<Item = (ConfigIndex, &WindowConfig)> {
    profile.windows.iter().enumerate().filter(|(_, config)| config.enabled)
}

/// Isolate a per-rule error: expected churn reads as "no match", the rest is logged
fn failure(config: &WindowConfig, err: PlacementError) -> PlacementStatus {
    match err {
        PlacementError::NotFound => {
            trace!(process = %config.process_name, "No matching window");
            PlacementStatus::NoMatch
        }
        PlacementError::StaleHandle { .. } => {
            debug!(process = %config.process_name, error = %err, "Window vanished during pass");
            PlacementStatus::NoMatch
        }
        other => {
            warn!(process = %config.process_name, error = %other, "Placement failed");
            PlacementStatus::Failed { reason: other.to_string() }
        }
    }
}
