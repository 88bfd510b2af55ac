//! In-memory desktop implementing both capability traits, for tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{PlacementError, PlacementResult};
use crate::platform::{ProcessDirectory, WindowSystem};
use crate::types::{image_names_match, ProcessEntry, ProcessId, Rect, WindowHandle};

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub pid: ProcessId,
    pub title: String,
    pub rect: Rect,
    pub visible: bool,
    pub minimized: bool,
    pub foreground: bool,
}

#[derive(Debug, Clone)]
struct FakeProcess {
    pid: ProcessId,
    name: String,
    alive: bool,
    main_window: Option<WindowHandle>,
}

/// Scripted windows and processes plus a log of mutating calls
#[derive(Default)]
pub struct FakeDesktop {
    windows: Mutex<Vec<FakeWindow>>,
    processes: Mutex<Vec<FakeProcess>>,
    calls: Mutex<Vec<String>>,
    launched: Mutex<Vec<(String, bool)>>,
    fail_set_bounds: AtomicBool,
    fail_foreground: AtomicBool,
    fail_launch: AtomicBool,
    fail_enumerate: AtomicBool,
    /// Windows removed right after enumeration, simulating a close race
    vanish_after_enumerate: Mutex<Vec<WindowHandle>>,
    /// Windows closed just before a move lands on them
    vanish_before_set_bounds: Mutex<Vec<WindowHandle>>,
    /// Stall applied to each enumeration, simulating a hung display server
    enumerate_delay: Mutex<Option<Duration>>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live process with one visible window
    pub fn spawn(&self, pid: ProcessId, name: &str, handle: WindowHandle, title: &str, rect: Rect) {
        self.add_process(pid, name);
        self.add_window(pid, handle, title, rect);
    }

    pub fn add_process(&self, pid: ProcessId, name: &str) {
        self.processes.lock().push(FakeProcess {
            pid,
            name: name.to_string(),
            alive: true,
            main_window: None,
        });
    }

    pub fn set_main_window(&self, pid: ProcessId, handle: Option<WindowHandle>) {
        for process in self.processes.lock().iter_mut().filter(|p| p.pid == pid) {
            process.main_window = handle;
        }
    }

    pub fn add_window(&self, pid: ProcessId, handle: WindowHandle, title: &str, rect: Rect) {
        self.windows.lock().push(FakeWindow {
            handle,
            pid,
            title: title.to_string(),
            rect,
            visible: true,
            minimized: false,
            foreground: false,
        });
    }

    /// Process exits: its windows go away and it is no longer alive
    pub fn kill(&self, pid: ProcessId) {
        self.windows.lock().retain(|w| w.pid != pid);
        for process in self.processes.lock().iter_mut().filter(|p| p.pid == pid) {
            process.alive = false;
        }
    }

    pub fn close_window(&self, handle: WindowHandle) {
        self.windows.lock().retain(|w| w.handle != handle);
    }

    pub fn window(&self, handle: WindowHandle) -> Option<FakeWindow> {
        self.windows.lock().iter().find(|w| w.handle == handle).cloned()
    }

    pub fn rect_of(&self, handle: WindowHandle) -> Option<Rect> {
        self.window(handle).map(|w| w.rect)
    }

    /// Simulates a user dragging the window somewhere else
    pub fn move_window(&self, handle: WindowHandle, rect: Rect) {
        if let Some(w) = self.windows.lock().iter_mut().find(|w| w.handle == handle) {
            w.rect = rect;
        }
    }

    pub fn set_minimized(&self, handle: WindowHandle, minimized: bool) {
        if let Some(w) = self.windows.lock().iter_mut().find(|w| w.handle == handle) {
            w.minimized = minimized;
        }
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        if let Some(w) = self.windows.lock().iter_mut().find(|w| w.handle == handle) {
            w.visible = visible;
        }
    }

    pub fn vanish_after_enumerate(&self, handle: WindowHandle) {
        self.vanish_after_enumerate.lock().push(handle);
    }

    /// Close `handle` on the next `set_bounds`, after the pass has matched it
    pub fn vanish_before_set_bounds(&self, handle: WindowHandle) {
        self.vanish_before_set_bounds.lock().push(handle);
    }

    pub fn set_enumerate_delay(&self, delay: Option<Duration>) {
        *self.enumerate_delay.lock() = delay;
    }

    pub fn set_fail_set_bounds(&self, v: bool) {
        self.fail_set_bounds.store(v, Ordering::SeqCst);
    }

    pub fn set_fail_foreground(&self, v: bool) {
        self.fail_foreground.store(v, Ordering::SeqCst);
    }

    pub fn set_fail_launch(&self, v: bool) {
        self.fail_launch.store(v, Ordering::SeqCst);
    }

    pub fn set_fail_enumerate(&self, v: bool) {
        self.fail_enumerate.store(v, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn launched(&self) -> Vec<(String, bool)> {
        self.launched.lock().clone()
    }

    fn note(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl WindowSystem for FakeDesktop {
    fn enumerate_top_level_windows(&self) -> PlacementResult<Vec<WindowHandle>> {
        let delay = *self.enumerate_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.fail_enumerate.load(Ordering::SeqCst) {
            return Err(PlacementError::os("enumerate", "display connection lost"));
        }
        let handles = self.windows.lock().iter().map(|w| w.handle).collect();
        for handle in self.vanish_after_enumerate.lock().drain(..) {
            self.close_window(handle);
        }
        Ok(handles)
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.window(window).is_some_and(|w| w.visible)
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        self.window(window).is_some_and(|w| w.minimized)
    }

    fn title(&self, window: WindowHandle) -> String {
        self.window(window).map(|w| w.title).unwrap_or_default()
    }

    fn owning_process_id(&self, window: WindowHandle) -> Option<ProcessId> {
        self.window(window).map(|w| w.pid)
    }

    fn rect(&self, window: WindowHandle) -> PlacementResult<Rect> {
        self.rect_of(window).ok_or(PlacementError::StaleHandle {
            window,
            operation: "get_geometry",
        })
    }

    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> PlacementResult<()> {
        self.note(format!("set_bounds {} {}", window, bounds));
        if self.fail_set_bounds.load(Ordering::SeqCst) {
            return Err(PlacementError::os("configure_window", "BadAccess"));
        }
        let vanishing: Vec<WindowHandle> = self.vanish_before_set_bounds.lock().drain(..).collect();
        for handle in vanishing {
            self.close_window(handle);
        }
        let mut windows = self.windows.lock();
        let target = windows
            .iter_mut()
            .find(|w| w.handle == window)
            .ok_or(PlacementError::StaleHandle {
                window,
                operation: "configure_window",
            })?;
        target.rect = bounds;
        Ok(())
    }

    fn set_foreground(&self, window: WindowHandle) -> bool {
        self.note(format!("set_foreground {}", window));
        if self.fail_foreground.load(Ordering::SeqCst) {
            return false;
        }
        let mut windows = self.windows.lock();
        if !windows.iter().any(|w| w.handle == window) {
            return false;
        }
        for w in windows.iter_mut() {
            w.foreground = w.handle == window;
        }
        true
    }

    fn restore_if_minimized(&self, window: WindowHandle) {
        self.note(format!("restore {}", window));
        self.set_minimized(window, false);
    }
}

impl ProcessDirectory for FakeDesktop {
    fn list_by_image_name(&self, name: &str) -> Vec<ProcessEntry> {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.alive && image_names_match(&p.name, name))
            .map(|p| ProcessEntry {
                pid: p.pid,
                image_name: p.name.clone(),
                main_window: p.main_window,
            })
            .collect()
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        self.processes.lock().iter().any(|p| p.pid == pid && p.alive)
    }

    fn start(&self, path_or_name: &str, _args: &[String], elevated: bool) -> PlacementResult<()> {
        self.note(format!("start {}", path_or_name));
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(PlacementError::os("spawn", "No such file or directory"));
        }
        self.launched.lock().push((path_or_name.to_string(), elevated));
        Ok(())
    }
}
