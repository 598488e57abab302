//! In-memory mirror of compositor state
//!
//! `StateStore` owns the only lock guarding the mirror. The dispatcher is the
//! single writer; everybody else reads through [`StateStore::with_lock`], which
//! never observes a partially applied event.

use parking_lot::Mutex;
use tracing::trace;

use crate::types::{Event, Window, Workspace};

/// The mirrored workspaces and windows
///
/// Workspaces are kept sorted by id. Windows keep the order in which they
/// were announced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    workspaces: Vec<Workspace>,
    windows: Vec<Window>,
}

impl Mirror {
    /// All workspaces, ascending by id
    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    /// All windows
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// True when nothing has been mirrored yet (or the compositor reported nothing)
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty() && self.windows.is_empty()
    }

    pub fn workspace(&self, id: u64) -> Option<&Workspace> {
        self.workspaces.iter().find(|ws| ws.id == id)
    }

    pub fn window(&self, id: u64) -> Option<&Window> {
        self.windows.iter().find(|win| win.id == id)
    }

    /// The workspace holding keyboard focus
    pub fn focused_workspace(&self) -> Option<&Workspace> {
        self.workspaces.iter().find(|ws| ws.is_focused)
    }

    /// The workspace visible on `output`
    pub fn active_workspace_on(&self, output: &str) -> Option<&Workspace> {
        self.workspaces
            .iter()
            .find(|ws| ws.is_active && ws.output == output)
    }

    /// Workspaces living on `output`, ascending by id
    pub fn workspaces_on<'a>(
        &'a self,
        output: &'a str,
    ) -> impl Iterator<Item = &'a Workspace> + 'a {
        self.workspaces.iter().filter(move |ws| ws.output == output)
    }

    /// Resolve a workspace's `active_window_idx` to a mirrored window
    ///
    /// Returns `None` when the index is unset, out of range, or names a window
    /// the mirror has not seen (yet).
    pub fn active_window_of(&self, workspace: &Workspace) -> Option<&Window> {
        let idx = workspace.active_window_idx?;
        let id = *workspace.windows.get(idx)?;
        self.window(id)
    }

    /// The window with keyboard focus
    pub fn focused_window(&self) -> Option<&Window> {
        self.windows.iter().find(|win| win.focused)
    }

    /// Whether `window` is the only window on its workspace
    pub fn is_solo(&self, window: &Window) -> bool {
        !self
            .windows
            .iter()
            .any(|win| win.id != window.id && win.workspace_id == window.workspace_id)
    }

    /// Apply one event to the mirror
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Workspaces(workspaces) => {
                self.workspaces = workspaces;
                self.sort_workspaces();
            }
            Event::ActiveWorkspaceChanged { id } => {
                for ws in &mut self.workspaces {
                    ws.is_active = ws.id == id;
                    ws.is_focused = ws.id == id;
                }
            }
            Event::WorkspaceChanged(workspace) => {
                match self.workspaces.iter_mut().find(|ws| ws.id == workspace.id) {
                    Some(existing) => existing.update_from(workspace),
                    None => {
                        self.workspaces.push(workspace);
                        self.sort_workspaces();
                    }
                }
            }
            Event::WorkspaceRemoved { id } => {
                self.workspaces.retain(|ws| ws.id != id);
            }
            Event::Windows(windows) => {
                self.windows = windows;
            }
            Event::WindowChanged(window) => {
                match self.windows.iter_mut().find(|win| win.id == window.id) {
                    Some(existing) => *existing = window,
                    None => self.windows.push(window),
                }
            }
            Event::WindowClosed { id } => {
                self.windows.retain(|win| win.id != id);
            }
            Event::WindowFocused { id } => {
                for win in &mut self.windows {
                    win.focused = Some(win.id) == id;
                }
            }
            Event::Other(name) => {
                trace!(event = %name, "Event does not touch the mirror");
            }
        }
    }

    fn sort_workspaces(&mut self) {
        self.workspaces.sort_by_key(|ws| ws.id);
    }
}

/// Lock-guarded owner of the [`Mirror`]
#[derive(Debug, Default)]
pub struct StateStore {
    mirror: Mutex<Mirror>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the mirror
    ///
    /// Do not call back into `with_lock` from inside `f`; the lock is not
    /// reentrant. Notification callbacks run outside the lock, so reading
    /// from one is fine.
    pub fn with_lock<R>(&self, f: impl FnOnce(&Mirror) -> R) -> R {
        let guard = self.mirror.lock();
        f(&guard)
    }

    /// Clone the current mirror
    pub fn snapshot(&self) -> Mirror {
        self.with_lock(Mirror::clone)
    }

    /// Apply an event under the lock. The guard is dropped before returning.
    pub(crate) fn apply(&self, event: Event) {
        let mut guard = self.mirror.lock();
        guard.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(id: u64, output: &str) -> Workspace {
        Workspace {
            id,
            output: output.to_string(),
            mwfact: 0.5,
            nmaster: 1,
            ..Default::default()
        }
    }

    fn win(id: u64, workspace_id: u64) -> Window {
        Window {
            id,
            title: format!("window {id}"),
            app_id: "foot".to_string(),
            workspace_id,
            ..Default::default()
        }
    }

    fn ids(mirror: &Mirror) -> Vec<u64> {
        mirror.workspaces().iter().map(|ws| ws.id).collect()
    }

    #[test]
    fn test_workspace_changed_keeps_sorted_order() {
        let mut mirror = Mirror::default();
        for id in [5, 2, 9, 1, 7, 2, 5, 3] {
            mirror.apply(Event::WorkspaceChanged(ws(id, "DP-1")));
            let current = ids(&mirror);
            let mut sorted = current.clone();
            sorted.sort_unstable();
            assert_eq!(current, sorted, "unsorted after inserting {id}");
        }
        assert_eq!(ids(&mirror), vec![1, 2, 3, 5, 7, 9]);
    }

    #[test]
    fn test_workspace_changed_updates_in_place() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1"), ws(2, "DP-1")]));
        mirror.apply(Event::ActiveWorkspaceChanged { id: 2 });

        let mut changed = ws(2, "HDMI-A-1");
        changed.windows = vec![10, 11];
        changed.active_window_idx = Some(1);
        mirror.apply(Event::WorkspaceChanged(changed));

        let updated = mirror.workspace(2).unwrap();
        assert_eq!(updated.output, "HDMI-A-1");
        assert_eq!(updated.windows, vec![10, 11]);
        assert_eq!(updated.active_window_idx, Some(1));
        // Activation is not part of the payload and survives the update
        assert!(updated.is_active);
        assert!(updated.is_focused);
        assert_eq!(mirror.workspaces().len(), 2);
    }

    #[test]
    fn test_active_workspace_changed_is_exclusive() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1"), ws(2, "DP-1"), ws(3, "DP-2")]));

        for target in [2, 3, 1] {
            mirror.apply(Event::ActiveWorkspaceChanged { id: target });
            let flagged: Vec<u64> = mirror
                .workspaces()
                .iter()
                .filter(|ws| ws.is_active && ws.is_focused)
                .map(|ws| ws.id)
                .collect();
            assert_eq!(flagged, vec![target]);
            assert!(mirror
                .workspaces()
                .iter()
                .filter(|ws| ws.id != target)
                .all(|ws| !ws.is_active && !ws.is_focused));
        }
    }

    #[test]
    fn test_active_workspace_changed_unknown_id_clears_all() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1")]));
        mirror.apply(Event::ActiveWorkspaceChanged { id: 1 });
        mirror.apply(Event::ActiveWorkspaceChanged { id: 42 });
        assert!(mirror.focused_workspace().is_none());
    }

    #[test]
    fn test_workspace_removed_is_idempotent() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1"), ws(2, "DP-1")]));

        mirror.apply(Event::WorkspaceRemoved { id: 2 });
        let after_first = mirror.clone();
        mirror.apply(Event::WorkspaceRemoved { id: 2 });

        assert_eq!(mirror, after_first);
        assert_eq!(ids(&mirror), vec![1]);
    }

    #[test]
    fn test_workspaces_replaces_previous_state() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1"), ws(2, "DP-1")]));
        mirror.apply(Event::ActiveWorkspaceChanged { id: 1 });
        mirror.apply(Event::Workspaces(vec![ws(4, "DP-2"), ws(3, "DP-2")]));

        assert_eq!(ids(&mirror), vec![3, 4]);
        assert!(mirror.focused_workspace().is_none());
    }

    #[test]
    fn test_window_focused_sets_single_window() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Windows(vec![win(1, 1), win(7, 3), win(9, 3)]));

        mirror.apply(Event::WindowFocused { id: Some(7) });
        let focused: Vec<u64> = mirror
            .windows()
            .iter()
            .filter(|w| w.focused)
            .map(|w| w.id)
            .collect();
        assert_eq!(focused, vec![7]);
        assert_eq!(mirror.focused_window().map(|w| w.id), Some(7));

        mirror.apply(Event::WindowFocused { id: Some(9) });
        assert_eq!(mirror.focused_window().map(|w| w.id), Some(9));
        assert!(!mirror.window(7).unwrap().focused);
    }

    #[test]
    fn test_window_focused_none_clears_all() {
        let mut mirror = Mirror::default();
        let mut focused = win(1, 1);
        focused.focused = true;
        let mut also_focused = win(2, 1);
        also_focused.focused = true;
        mirror.apply(Event::Windows(vec![focused, also_focused]));

        mirror.apply(Event::WindowFocused { id: None });
        assert!(mirror.windows().iter().all(|w| !w.focused));
    }

    #[test]
    fn test_window_changed_upserts_without_sorting() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Windows(vec![win(5, 1)]));
        mirror.apply(Event::WindowChanged(win(2, 1)));

        let mut renamed = win(5, 2);
        renamed.title = "renamed".to_string();
        mirror.apply(Event::WindowChanged(renamed));

        let order: Vec<u64> = mirror.windows().iter().map(|w| w.id).collect();
        assert_eq!(order, vec![5, 2]);
        assert_eq!(mirror.window(5).unwrap().title, "renamed");
        assert_eq!(mirror.window(5).unwrap().workspace_id, 2);
    }

    #[test]
    fn test_window_closed_removes_only_match() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Windows(vec![win(1, 1), win(2, 1)]));
        mirror.apply(Event::WindowClosed { id: 1 });
        mirror.apply(Event::WindowClosed { id: 99 });
        assert_eq!(mirror.windows().len(), 1);
        assert!(mirror.window(2).is_some());
    }

    #[test]
    fn test_other_event_leaves_mirror_untouched() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Windows(vec![win(1, 1)]));
        let before = mirror.clone();
        mirror.apply(Event::Other("layout-changed".to_string()));
        assert_eq!(mirror, before);
    }

    #[test]
    fn test_active_window_lookup() {
        let mut mirror = Mirror::default();
        let mut workspace = ws(3, "DP-1");
        workspace.windows = vec![7, 8];
        workspace.active_window_idx = Some(1);
        mirror.apply(Event::Workspaces(vec![workspace]));
        mirror.apply(Event::Windows(vec![win(7, 3), win(8, 3)]));

        let ws = mirror.workspace(3).unwrap();
        assert_eq!(mirror.active_window_of(ws).map(|w| w.id), Some(8));

        let mut out_of_range = ws.clone();
        out_of_range.active_window_idx = Some(5);
        assert!(mirror.active_window_of(&out_of_range).is_none());

        let mut unset = ws.clone();
        unset.active_window_idx = None;
        assert!(mirror.active_window_of(&unset).is_none());
    }

    #[test]
    fn test_output_queries() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Workspaces(vec![ws(1, "DP-1"), ws(2, "DP-2"), ws(3, "DP-1")]));
        mirror.apply(Event::ActiveWorkspaceChanged { id: 3 });

        let on_dp1: Vec<u64> = mirror.workspaces_on("DP-1").map(|ws| ws.id).collect();
        assert_eq!(on_dp1, vec![1, 3]);
        assert_eq!(mirror.active_workspace_on("DP-1").map(|ws| ws.id), Some(3));
        assert!(mirror.active_workspace_on("DP-2").is_none());
    }

    #[test]
    fn test_is_solo() {
        let mut mirror = Mirror::default();
        mirror.apply(Event::Windows(vec![win(1, 1), win(2, 1), win(3, 2)]));
        assert!(!mirror.is_solo(mirror.window(1).unwrap()));
        assert!(mirror.is_solo(mirror.window(3).unwrap()));
    }

    #[test]
    fn test_store_with_lock_and_snapshot() {
        let store = StateStore::new();
        assert!(store.with_lock(Mirror::is_empty));

        store.apply(Event::Workspaces(vec![ws(1, "DP-1")]));
        let count = store.with_lock(|mirror| mirror.workspaces().len());
        assert_eq!(count, 1);

        let snapshot = store.snapshot();
        store.apply(Event::WorkspaceRemoved { id: 1 });
        assert_eq!(snapshot.workspaces().len(), 1);
        assert!(store.with_lock(Mirror::is_empty));
    }

    #[test]
    fn test_panicking_reader_does_not_wedge_store() {
        let store = StateStore::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.with_lock(|mirror: &Mirror| -> usize {
                if mirror.is_empty() {
                    panic!("reader failed");
                }
                mirror.workspaces().len()
            })
        }));
        assert!(result.is_err());

        store.apply(Event::Workspaces(vec![ws(1, "DP-1")]));
        assert_eq!(store.with_lock(|mirror| mirror.workspaces().len()), 1);
    }
}
