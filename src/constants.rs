//! Application-wide constants
//!
//! Magic numbers and string literals used throughout the daemon, kept in one
//! place so the engine, the backends and the CLI agree on them.

/// Engine timing constants
pub mod engine {
    /// Default interval between continuous ticks
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

    /// Lower bound accepted for `poll_interval_ms`
    pub const MIN_POLL_INTERVAL_MS: u64 = 50;

    /// Upper bound accepted for `poll_interval_ms`
    pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

    /// How long `stop()` waits for an in-flight tick before detaching the worker
    pub const STOP_DRAIN_TIMEOUT_MS: u64 = 2_000;
}

/// X11 protocol constants
pub mod x11 {
    /// Size of PID property value in bytes
    pub const PID_PROPERTY_SIZE: usize = 4;

    /// Source indication for _NET_ACTIVE_WINDOW (2 = pager/direct user action)
    pub const ACTIVE_WINDOW_SOURCE_PAGER: u32 = 2;

    /// Maximum title length requested from the server (in 32-bit units)
    pub const TITLE_PROPERTY_LENGTH: u32 = 1024;
}

/// Process directory constants
pub mod process {
    /// Root of the procfs mount
    pub const PROC_ROOT: &str = "/proc";

    /// Executable suffix ignored when comparing image names
    pub const EXE_SUFFIX: &str = ".exe";

    /// Wine preloader binaries; processes running under these are named by `comm`
    pub const WINE_PRELOADERS: [&str; 2] = ["wine64-preloader", "wine-preloader"];

    /// Helper used to launch a target with elevated privileges
    pub const ELEVATION_HELPER: &str = "pkexec";
}

/// Configuration file locations
pub mod config {
    /// Directory under the user's config dir
    pub const APP_DIR: &str = "window-keeper";

    /// Settings file name
    pub const FILENAME: &str = "config.json";

    /// Name of the profile created when no settings file exists
    pub const DEFAULT_PROFILE: &str = "default";
}

/// IPC socket constants
pub mod ipc {
    /// Socket path relative to the runtime (or cache) directory
    pub const SOCKET_RELATIVE_PATH: &str = "window-keeper/engine.sock";

    /// Largest accepted frame. Outcome lists for a profile stay far below this.
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// How long the CLI waits for the daemon to answer. A reload can block
    /// on stopping the old worker, so this sits well above the drain timeout.
    pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
}

/// Daemon main-loop constants
pub mod daemon {
    /// How often the main loop checks signal flags and queued commands
    pub const COMMAND_POLL_MS: u64 = 100;
}
