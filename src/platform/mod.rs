//! Capability interfaces the engine consumes, plus their Linux implementations
//!
//! The engine never talks to X11 or procfs directly; it only sees these two
//! traits. `x11` and `procfs` are the production backends, `fake` is an
//! in-memory desktop for tests.

pub mod procfs;
pub mod x11;

#[cfg(test)]
pub mod fake;

use crate::error::PlacementResult;
use crate::types::{ProcessEntry, ProcessId, Rect, WindowHandle};

/// Primitive window operations
pub trait WindowSystem: Send + Sync {
    /// Snapshot of the current top-level windows
    fn enumerate_top_level_windows(&self) -> PlacementResult<Vec<WindowHandle>>;

    fn is_visible(&self, window: WindowHandle) -> bool;

    fn is_minimized(&self, window: WindowHandle) -> bool;

    /// Current title, empty if the window has none or is gone
    fn title(&self, window: WindowHandle) -> String;

    /// `None` when the window does not advertise its owner (or vanished)
    fn owning_process_id(&self, window: WindowHandle) -> Option<ProcessId>;

    /// Fails with `StaleHandle` when the window no longer exists
    fn rect(&self, window: WindowHandle) -> PlacementResult<Rect>;

    /// Single move/resize request
    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> PlacementResult<()>;

    fn set_foreground(&self, window: WindowHandle) -> bool;

    fn restore_if_minimized(&self, window: WindowHandle);
}

/// Running-process queries and process start
pub trait ProcessDirectory: Send + Sync {
    fn list_by_image_name(&self, name: &str) -> Vec<ProcessEntry>;

    fn is_alive(&self, pid: ProcessId) -> bool;

    /// Start `path_or_name` detached; `elevated` asks for privilege elevation
    fn start(&self, path_or_name: &str, args: &[String], elevated: bool) -> PlacementResult<()>;
}
