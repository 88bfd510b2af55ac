//! Process directory backed by /proc

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

use crate::constants::process::{ELEVATION_HELPER, PROC_ROOT, WINE_PRELOADERS};
use crate::error::{PlacementError, PlacementResult};
use crate::platform::ProcessDirectory;
use crate::types::{image_names_match, ProcessEntry, ProcessId};

/// `ProcessDirectory` reading a procfs mount
pub struct ProcfsDirectory {
    root: PathBuf,
}

impl Default for ProcfsDirectory {
    fn default() -> Self {
        Self {
            root: PathBuf::from(PROC_ROOT),
        }
    }
}

impl ProcfsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different procfs root (tests point this at a temp dir)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pids(&self) -> Vec<ProcessId> {
        match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().to_str()?.parse::<ProcessId>().ok())
                .collect(),
            Err(e) => {
                error!(path = %self.root.display(), error = %e, "Failed to read process list");
                Vec::new()
            }
        }
    }

    /// Image name of `pid`: the executable's file name, unless the process is
    /// hosted by a Wine preloader, in which case `comm` carries the real name.
    pub fn image_name(&self, pid: ProcessId) -> Option<String> {
        let proc_dir = self.root.join(pid.to_string());
        let exe_name = fs::read_link(proc_dir.join("exe"))
            .ok()
            .and_then(|path| file_name(&path));

        match exe_name {
            Some(name) if !WINE_PRELOADERS.contains(&name.as_str()) => Some(name),
            _ => fs::read_to_string(proc_dir.join("comm"))
                .ok()
                .map(|comm| comm.trim_end_matches('\n').to_string())
                .filter(|comm| !comm.is_empty()),
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    // Deleted executables show up as "name (deleted)"
    let name = path.file_name()?.to_string_lossy();
    Some(name.trim_end_matches(" (deleted)").to_string())
}

impl ProcessDirectory for ProcfsDirectory {
    /// Entries never carry a `main_window`, so the matcher falls back to
    /// enumeration order for every process found here.
    fn list_by_image_name(&self, name: &str) -> Vec<ProcessEntry> {
        self.pids()
            .into_iter()
            .filter_map(|pid| {
                // Processes exiting mid-scan simply drop out
                let image_name = self.image_name(pid)?;
                image_names_match(&image_name, name).then_some(ProcessEntry {
                    pid,
                    image_name,
                    main_window: None,
                })
            })
            .collect()
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn start(&self, path_or_name: &str, args: &[String], elevated: bool) -> PlacementResult<()> {
        let mut command = if elevated {
            let mut command = Command::new(ELEVATION_HELPER);
            command.arg(path_or_name);
            command
        } else {
            Command::new(path_or_name)
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| PlacementError::os("spawn", format!("{}: {}", path_or_name, e)))?;
        let pid = child.id();
        info!(pid = pid, target = %path_or_name, elevated = elevated, "Launched process");

        // Reap the child so it does not linger as a zombie
        let target = path_or_name.to_string();
        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!(pid = pid, target = %target, status = ?status.code(), "Launched process exited"),
            Err(e) => warn!(pid = pid, target = %target, error = %e, "Failed to wait for launched process"),
        });
        Ok(())
    }
}
