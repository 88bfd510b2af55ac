//! Small value types shared by the engine and the platform backends

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level window identifier (an X11 window id)
pub type WindowHandle = u32;

/// Operating-system process id
pub type ProcessId = u32;

/// Window bounds in root-window coordinates
///
/// Signed width/height so that degenerate configured sizes can be represented
/// and rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// True when both dimensions are strictly positive
    pub fn has_positive_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// A running process as reported by the process directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: ProcessId,
    pub image_name: String,
    /// Primary window when the directory knows it. Only used to rank a
    /// process's windows in the matcher. `ProcfsDirectory` always leaves it
    /// `None`, so on Linux ranking falls back to enumeration order.
    pub main_window: Option<WindowHandle>,
}

/// A live window chosen by the matcher for one configuration
///
/// Only valid for the tick that produced it: the window or its process can
/// disappear at any moment, so nothing holds on to it across ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedWindow {
    pub window: WindowHandle,
    pub pid: ProcessId,
    pub image_name: String,
    pub title: String,
}

/// Compare two process image names the way the matcher does:
/// case-insensitive, exact, ignoring a trailing `.exe` on either side.
pub fn image_names_match(a: &str, b: &str) -> bool {
    normalize_image_name(a) == normalize_image_name(b)
}

fn normalize_image_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(crate::constants::process::EXE_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}
