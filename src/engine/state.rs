use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::platform::ProcessDirectory;
use crate::types::ProcessId;

/// Position of a rule inside the active profile
pub type ConfigIndex = usize;

/// What the engine has done to one process during the current session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlacementRecord {
    /// Rule that positioned this process, once one has
    pub handled_by: Option<ConfigIndex>,
    /// Rules whose invalid geometry has already been reported
    pub geometry_reported: BTreeSet<ConfigIndex>,
}

/// Per-process placement memory, keyed by pid
///
/// A process is positioned at most once per session: after any rule has
/// been applied to it, every other rule matching the same pid is skipped.
/// One instance backs the continuous session (cleared on every reload) and a
/// fresh one is created for each one-shot test run. Process ids are not
/// fingerprinted, so a reused pid is only told apart once the old process has
/// been seen dead.
#[derive(Debug, Default)]
pub struct ProcessPlacementState {
    generation: u64,
    records: HashMap<ProcessId, PlacementRecord>,
}

impl ProcessPlacementState {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            records: HashMap::new(),
        }
    }

    /// Session this state belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether any rule has been applied to `pid`
    pub fn has_been_handled(&self, pid: ProcessId) -> bool {
        self.handled_by(pid).is_some()
    }

    pub fn handled_by(&self, pid: ProcessId) -> Option<ConfigIndex> {
        self.records.get(&pid).and_then(|r| r.handled_by)
    }

    /// Like `has_been_handled`, but first confirms the process still exists. A
    /// dead pid is dropped so a new process reusing the id is treated as unseen.
    pub fn is_handled_and_alive(&mut self, pid: ProcessId, processes: &dyn ProcessDirectory) -> bool {
        if !self.has_been_handled(pid) {
            return false;
        }
        if processes.is_alive(pid) {
            return true;
        }
        debug!(pid = pid, "Tracked process is gone, forgetting it");
        self.records.remove(&pid);
        false
    }

    /// Start tracking `pid` if it is not tracked yet
    pub fn observe(&mut self, pid: ProcessId) -> &mut PlacementRecord {
        self.records.entry(pid).or_default()
    }

    /// Record that `config` positioned `pid`. The first rule to do so is kept.
    pub fn mark_handled(&mut self, pid: ProcessId, config: ConfigIndex) {
        self.observe(pid).handled_by.get_or_insert(config);
    }

    /// Returns true the first time invalid geometry is seen for this pid/rule
    pub fn note_invalid_geometry(&mut self, pid: ProcessId, config: ConfigIndex) -> bool {
        self.observe(pid).geometry_reported.insert(config)
    }

    /// Drop entries for processes that are no longer alive
    pub fn reap(&mut self, processes: &dyn ProcessDirectory) -> usize {
        let before = self.records.len();
        self.records.retain(|pid, _| processes.is_alive(*pid));
        let removed = before - self.records.len();
        if removed > 0 {
            debug!(removed = removed, remaining = self.records.len(), "Reaped dead processes");
        }
        removed
    }

    /// Forget everything and start a new session
    pub fn reset(&mut self, generation: u64) {
        self.records.clear();
        self.generation = generation;
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeDesktop;
    use crate::types::Rect;

    #[test]
    fn test_mark_and_query() {
        let mut state = ProcessPlacementState::new(0);
        assert!(!state.has_been_handled(42));

        state.mark_handled(42, 0);
        assert!(state.has_been_handled(42));
        assert_eq!(state.handled_by(42), Some(0));
        assert!(!state.has_been_handled(43));

        // A second rule does not take over the record
        state.mark_handled(42, 1);
        assert_eq!(state.handled_by(42), Some(0));
    }

    #[test]
    fn test_unhandled_pid_not_checked_for_liveness() {
        let desktop = FakeDesktop::new();
        let mut state = ProcessPlacementState::new(0);
        state.observe(9);
        assert!(!state.is_handled_and_alive(9, &desktop));
        assert_eq!(state.tracked(), 1);
    }

    #[test]
    fn test_observed_but_unhandled() {
        let mut state = ProcessPlacementState::new(0);
        state.observe(7);
        assert_eq!(state.tracked(), 1);
        assert!(!state.has_been_handled(7));
    }

    #[test]
    fn test_invalid_geometry_reported_once() {
        let mut state = ProcessPlacementState::new(0);
        assert!(state.note_invalid_geometry(5, 2));
        assert!(!state.note_invalid_geometry(5, 2));
        assert!(state.note_invalid_geometry(5, 3));
        assert!(!state.has_been_handled(5));
    }

    #[test]
    fn test_dead_pid_treated_as_unseen() {
        let desktop = FakeDesktop::new();
        desktop.spawn(100, "notepad", 1, "Untitled", Rect::new(0, 0, 10, 10));
        let mut state = ProcessPlacementState::new(0);
        state.mark_handled(100, 0);

        assert!(state.is_handled_and_alive(100, &desktop));

        desktop.kill(100);
        assert!(!state.is_handled_and_alive(100, &desktop));
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_reap_removes_only_dead() {
        let desktop = FakeDesktop::new();
        desktop.add_process(1, "a");
        desktop.add_process(2, "b");
        let mut state = ProcessPlacementState::new(0);
        state.mark_handled(1, 0);
        state.mark_handled(2, 0);

        desktop.kill(2);
        assert_eq!(state.reap(&desktop), 1);
        assert!(state.has_been_handled(1));
        assert!(!state.has_been_handled(2));
    }

    #[test]
    fn test_reset_clears_and_bumps_generation() {
        let mut state = ProcessPlacementState::new(3);
        state.mark_handled(1, 0);
        state.reset(4);
        assert_eq!(state.tracked(), 0);
        assert_eq!(state.generation(), 4);
    }
}
