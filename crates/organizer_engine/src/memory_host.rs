//! A [`TabHost`] kept entirely in memory.
//!
//! Mirrors the browser behaviours the reconciler depends on: all-or-nothing
//! batch calls, groups discarded once empty, windows closed once their last
//! tab leaves, and a blank placeholder tab in every freshly created window.
use std::sync::{Mutex, MutexGuard};

use organizer_core::plan::PLACEHOLDER_URLS;
use organizer_core::{Group, GroupId, Tab, TabId, Window, WindowId, WindowKind};

use crate::host::{GroupUpdate, TabHost, TabQuery};
use crate::HostError;

#[derive(Debug, Default)]
struct HostState {
    windows: Vec<Window>,
    tabs: Vec<Tab>,
    groups: Vec<Group>,
    next_id: u64,
}

impl HostState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn window(&self, window_id: WindowId) -> Result<&Window, HostError> {
        self.windows
            .iter()
            .find(|window| window.id == window_id)
            .ok_or(HostError::WindowNotFound(window_id))
    }

    fn normal_window(&self, window_id: WindowId) -> Result<&Window, HostError> {
        let window = self.window(window_id)?;
        if !window.kind.is_normal() {
            return Err(HostError::Rejected(format!(
                "window {window_id} is a {} window",
                window.kind
            )));
        }
        Ok(window)
    }

    fn group(&self, group_id: GroupId) -> Result<&Group, HostError> {
        self.groups
            .iter()
            .find(|group| group.id == group_id)
            .ok_or(HostError::GroupNotFound(group_id))
    }

    fn require_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        if tab_ids.is_empty() {
            return Err(HostError::Rejected("no tabs given".to_string()));
        }
        for id in tab_ids {
            if !self.tabs.iter().any(|tab| tab.id == *id) {
                return Err(HostError::TabNotFound(*id));
            }
        }
        Ok(())
    }

    fn window_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.tabs
            .iter()
            .find(|tab| tab.id == tab_id)
            .map(|tab| tab.window_id)
    }

    /// Moves tabs to the end of `window_id`. Tabs changing window leave their group.
    fn relocate(&mut self, tab_ids: &[TabId], window_id: WindowId) -> Vec<WindowId> {
        let mut sources = Vec::new();
        for id in tab_ids {
            let Some(position) = self.tabs.iter().position(|tab| tab.id == *id) else {
                continue;
            };
            if self.tabs[position].window_id == window_id {
                continue;
            }
            let mut tab = self.tabs.remove(position);
            sources.push(tab.window_id);
            tab.window_id = window_id;
            tab.group_id = None;
            self.tabs.push(tab);
        }
        sources
    }

    fn settle(&mut self, emptied_candidates: &[WindowId]) {
        let tabs = &self.tabs;
        self.groups
            .retain(|group| tabs.iter().any(|tab| tab.group_id == Some(group.id)));
        self.windows.retain(|window| {
            !emptied_candidates.contains(&window.id)
                || tabs.iter().any(|tab| tab.window_id == window.id)
        });
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_window(&self, kind: WindowKind) -> WindowId {
        let mut state = self.lock();
        let id = state.allocate();
        state.windows.push(Window {
            id,
            kind,
            focused: false,
        });
        id
    }

    pub fn add_tab(
        &self,
        window_id: WindowId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<TabId, HostError> {
        let mut state = self.lock();
        state.window(window_id)?;
        let id = state.allocate();
        state.tabs.push(Tab {
            id,
            window_id,
            url: url.into(),
            title: title.into(),
            group_id: None,
        });
        Ok(id)
    }

    /// Creates a titled group directly, even when the title is already taken.
    pub fn add_group(
        &self,
        window_id: WindowId,
        title: impl Into<String>,
        tab_ids: &[TabId],
    ) -> Result<GroupId, HostError> {
        let mut state = self.lock();
        state.normal_window(window_id)?;
        state.require_tabs(tab_ids)?;
        let id = state.allocate();
        state.groups.push(Group {
            id,
            window_id,
            title: title.into(),
            collapsed: false,
        });
        let sources = state.relocate(tab_ids, window_id);
        for tab in state.tabs.iter_mut().filter(|tab| tab_ids.contains(&tab.id)) {
            tab.group_id = Some(id);
        }
        state.settle(&sources);
        Ok(id)
    }

    /// Inserts a tab reported by the browser, or refreshes its URL and title.
    pub fn upsert_tab(&self, tab: Tab) -> Result<(), HostError> {
        let mut state = self.lock();
        if let Some(existing) = state.tabs.iter_mut().find(|t| t.id == tab.id) {
            existing.url = tab.url;
            existing.title = tab.title;
            return Ok(());
        }
        state.window(tab.window_id)?;
        state.next_id = state.next_id.max(tab.id);
        state.tabs.push(Tab {
            group_id: None,
            ..tab
        });
        Ok(())
    }

    pub fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.lock();
        let window_id = state.window_of(tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        state.tabs.retain(|tab| tab.id != tab_id);
        state.settle(&[window_id]);
        Ok(())
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.lock().tabs.iter().find(|tab| tab.id == tab_id).cloned()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.lock().tabs.clone()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.lock().groups.clone()
    }

    pub fn windows(&self) -> Vec<Window> {
        self.lock().windows.clone()
    }
}

#[async_trait::async_trait]
impl TabHost for InMemoryHost {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<Tab>, HostError> {
        let state = self.lock();
        Ok(state
            .tabs
            .iter()
            .filter(|tab| query.matches(tab))
            .cloned()
            .collect())
    }

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        let mut state = self.lock();
        state.require_tabs(tab_ids)?;
        let windows: Vec<WindowId> = tab_ids
            .iter()
            .filter_map(|id| state.window_of(*id))
            .collect();
        state.tabs.retain(|tab| !tab_ids.contains(&tab.id));
        state.settle(&windows);
        Ok(())
    }

    async fn move_tabs(&self, tab_ids: &[TabId], window_id: WindowId) -> Result<(), HostError> {
        let mut state = self.lock();
        state.normal_window(window_id)?;
        state.require_tabs(tab_ids)?;
        let sources = state.relocate(tab_ids, window_id);
        state.settle(&sources);
        Ok(())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: GroupId) -> Result<(), HostError> {
        let mut state = self.lock();
        let window_id = state.group(group_id)?.window_id;
        state.require_tabs(tab_ids)?;
        let sources = state.relocate(tab_ids, window_id);
        for tab in state.tabs.iter_mut().filter(|tab| tab_ids.contains(&tab.id)) {
            tab.group_id = Some(group_id);
        }
        state.settle(&sources);
        Ok(())
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        let mut state = self.lock();
        state.require_tabs(tab_ids)?;
        for tab in state.tabs.iter_mut().filter(|tab| tab_ids.contains(&tab.id)) {
            tab.group_id = None;
        }
        state.settle(&[]);
        Ok(())
    }

    async fn create_group(
        &self,
        window_id: WindowId,
        tab_ids: &[TabId],
    ) -> Result<GroupId, HostError> {
        let mut state = self.lock();
        state.normal_window(window_id)?;
        state.require_tabs(tab_ids)?;
        let id = state.allocate();
        state.groups.push(Group {
            id,
            window_id,
            title: String::new(),
            collapsed: false,
        });
        let sources = state.relocate(tab_ids, window_id);
        for tab in state.tabs.iter_mut().filter(|tab| tab_ids.contains(&tab.id)) {
            tab.group_id = Some(id);
        }
        state.settle(&sources);
        Ok(id)
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        update: &GroupUpdate,
    ) -> Result<Group, HostError> {
        let mut state = self.lock();
        let group = state
            .groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or(HostError::GroupNotFound(group_id))?;
        if let Some(title) = &update.title {
            group.title = title.clone();
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        Ok(group.clone())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Group, HostError> {
        self.lock().group(group_id).cloned()
    }

    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<Group>, HostError> {
        let state = self.lock();
        Ok(state
            .groups
            .iter()
            .filter(|group| group.window_id == window_id)
            .cloned()
            .collect())
    }

    async fn get_window(&self, window_id: WindowId) -> Result<Window, HostError> {
        self.lock().window(window_id).cloned()
    }

    async fn current_window(&self) -> Result<Window, HostError> {
        let state = self.lock();
        state
            .windows
            .iter()
            .find(|window| window.focused)
            .or_else(|| state.windows.first())
            .cloned()
            .ok_or(HostError::NoWindows)
    }

    async fn list_windows(&self) -> Result<Vec<Window>, HostError> {
        Ok(self.lock().windows.clone())
    }

    async fn create_window(&self) -> Result<Window, HostError> {
        let mut state = self.lock();
        let window = Window {
            id: state.allocate(),
            kind: WindowKind::Normal,
            focused: false,
        };
        state.windows.push(window.clone());
        let placeholder = state.allocate();
        state.tabs.push(Tab {
            id: placeholder,
            window_id: window.id,
            url: PLACEHOLDER_URLS[0].to_string(),
            title: "New Tab".to_string(),
            group_id: None,
        });
        Ok(window)
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        let mut state = self.lock();
        state.window(window_id)?;
        for window in state.windows.iter_mut() {
            window.focused = window.id == window_id;
        }
        Ok(())
    }

    async fn remove_window(&self, window_id: WindowId) -> Result<(), HostError> {
        let mut state = self.lock();
        state.window(window_id)?;
        state.windows.retain(|window| window.id != window_id);
        state.tabs.retain(|tab| tab.window_id != window_id);
        state.settle(&[]);
        Ok(())
    }
}
