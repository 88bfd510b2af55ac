//! Maps a window rule to a live window

use std::collections::HashMap;
use tracing::trace;

use crate::config::WindowConfig;
use crate::error::{PlacementError, PlacementResult};
use crate::platform::{ProcessDirectory, WindowSystem};
use crate::types::{MatchedWindow, ProcessEntry, ProcessId};

pub struct WindowMatcher<'a> {
    windows: &'a dyn WindowSystem,
    processes: &'a dyn ProcessDirectory,
}

impl<'a> WindowMatcher<'a> {
    pub fn new(windows: &'a dyn WindowSystem, processes: &'a dyn ProcessDirectory) -> Self {
        Self { windows, processes }
    }

    /// All visible top-level windows owned by a process named `process_filter`
    /// whose title contains `title_hint` (case-insensitive). An empty hint
    /// accepts every window, including untitled ones.
    ///
    /// Ranking only happens when the process directory reports a
    /// `main_window`: that window then comes before its process's other
    /// windows. `ProcfsDirectory` never reports one, so against the live
    /// desktop the order is the window system's enumeration order, which is
    /// not stable.
    pub fn find(&self, process_filter: &str, title_hint: &str) -> PlacementResult<Vec<MatchedWindow>> {
        let owners: HashMap<ProcessId, ProcessEntry> = self
            .processes
            .list_by_image_name(process_filter)
            .into_iter()
            .map(|p| (p.pid, p))
            .collect();
        if owners.is_empty() {
            return Ok(Vec::new());
        }

        let hint = title_hint.to_lowercase();
        let mut candidates = Vec::new();
        for window in self.windows.enumerate_top_level_windows()? {
            // Windows closing mid-scan fail these lookups and are skipped
            let Some(pid) = self.windows.owning_process_id(window) else {
                continue;
            };
            let Some(owner) = owners.get(&pid) else {
                continue;
            };
            if !self.windows.is_visible(window) {
                continue;
            }

            let title = self.windows.title(window);
            if !hint.is_empty() && (title.is_empty() || !title.to_lowercase().contains(&hint)) {
                trace!(window = window, title = %title, hint = %title_hint, "Title does not contain hint");
                continue;
            }

            let is_main = owner.main_window == Some(window);
            candidates.push((
                is_main,
                MatchedWindow {
                    window,
                    pid,
                    image_name: owner.image_name.clone(),
                    title,
                },
            ));
        }

        // Stable: enumeration order is kept within each group
        candidates.sort_by_key(|(is_main, _)| !*is_main);
        Ok(candidates.into_iter().map(|(_, m)| m).collect())
    }

    /// Best candidate for `config`: an exact (case-insensitive) title match
    /// wins, otherwise the first candidate found. `NotFound` when nothing matches.
    pub fn find_best(&self, config: &WindowConfig) -> PlacementResult<MatchedWindow> {
        let mut candidates = self.find(&config.process_name, &config.title_hint)?;
        if candidates.is_empty() {
            return Err(PlacementError::NotFound);
        }

        let exact = if config.title_hint.is_empty() {
            None
        } else {
            candidates
                .iter()
                .position(|c| c.title.to_lowercase() == config.title_hint.to_lowercase())
        };
        Ok(candidates.swap_remove(exact.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeDesktop;
    use crate::types::Rect;

    fn rect() -> Rect {
        Rect::new(0, 0, 300, 300)
    }

    #[test]
    fn test_find_by_process_name_case_insensitive() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "Notepad", 1, "Untitled - Notepad", rect());
        desktop.spawn(200, "firefox", 2, "Mozilla Firefox", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let found = matcher.find("notepad", "").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].window, 1);
        assert_eq!(found[0].pid, 100);
        assert_eq!(found[0].image_name, "Notepad");
    }

    #[test]
    fn test_process_name_is_exact_not_substring() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad++", 1, "new 1", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert!(matcher.find("notepad", "").unwrap().is_empty());
    }

    #[test]
    fn test_hint_filters_titles() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "Untitled - Notepad", rect());
        desktop.spawn(101, "notepad", 2, "todo.txt - Notepad", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let found = matcher.find("notepad", "UNTITLED").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].window, 1);
        for candidate in &found {
            assert!(candidate.title.to_lowercase().contains("untitled"));
        }
    }

    #[test]
    fn test_untitled_window_only_matches_without_hint() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert!(matcher.find("notepad", "x").unwrap().is_empty());
        assert_eq!(matcher.find("notepad", "").unwrap().len(), 1);
    }

    #[test]
    fn test_invisible_windows_skipped() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "Untitled", rect());
        desktop.set_visible(1, false);

        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert!(matcher.find("notepad", "").unwrap().is_empty());
    }

    #[test]
    fn test_find_best_prefers_exact_title() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "editor", 1, "notes - backup", rect());
        desktop.spawn(101, "editor", 2, "Notes", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let config = WindowConfig::new("editor").with_title_hint("notes");
        let best = matcher.find_best(&config).unwrap();
        assert_eq!(best.window, 2);
    }

    #[test]
    fn test_find_best_falls_back_to_first() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "editor", 1, "notes one", rect());
        desktop.spawn(101, "editor", 2, "notes two", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let config = WindowConfig::new("editor").with_title_hint("notes");
        assert_eq!(matcher.find_best(&config).unwrap().window, 1);
    }

    #[test]
    fn test_main_window_preferred() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "editor", 1, "Tools", rect());
        desktop.add_window(100, 2, "Document", rect());
        desktop.set_main_window(100, Some(2));

        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert_eq!(matcher.find_best(&WindowConfig::new("editor")).unwrap().window, 2);
        // A hint still narrows the candidates first
        let tools = WindowConfig::new("editor").with_title_hint("tool");
        assert_eq!(matcher.find_best(&tools).unwrap().window, 1);
    }

    #[test]
    fn test_without_main_window_enumeration_order_kept() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "editor", 1, "Tools", rect());
        desktop.add_window(100, 2, "Document", rect());

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let windows: Vec<_> = matcher.find("editor", "").unwrap().into_iter().map(|m| m.window).collect();
        assert_eq!(windows, vec![1, 2]);
    }

    #[test]
    fn test_find_best_none_when_not_running() {
        let desktop = FakeDesktop::new();
        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert_eq!(matcher.find_best(&WindowConfig::new("notepad")), Err(PlacementError::NotFound));
    }

    #[test]
    fn test_window_vanishing_mid_scan_is_skipped() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "Untitled", rect());
        desktop.spawn(101, "notepad", 2, "Other", rect());
        desktop.vanish_after_enumerate(1);

        let matcher = WindowMatcher::new(&desktop, &desktop);
        let found = matcher.find("notepad", "").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].window, 2);
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "Untitled", rect());
        desktop.set_fail_enumerate(true);

        let matcher = WindowMatcher::new(&desktop, &desktop);
        assert!(matcher.find("notepad", "").is_err());
    }
}
