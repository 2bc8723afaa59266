use organizer_core::{Group, GroupId, Tab, TabId, Window, WindowId};

use crate::HostError;

/// Filter for [`TabHost::query_tabs`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabQuery {
    pub window_id: Option<WindowId>,
    pub group_id: Option<GroupId>,
    pub url: Option<String>,
}

impl TabQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    pub fn in_group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, tab: &Tab) -> bool {
        self.window_id.is_none_or(|id| tab.window_id == id)
            && self.group_id.is_none_or(|id| tab.group_id == Some(id))
            && self.url.as_deref().is_none_or(|url| tab.url == url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub collapsed: Option<bool>,
}

impl GroupUpdate {
    pub fn collapsed(collapsed: bool) -> Self {
        Self {
            title: None,
            collapsed: Some(collapsed),
        }
    }

    pub fn titled(title: impl Into<String>, collapsed: bool) -> Self {
        Self {
            title: Some(title.into()),
            collapsed: Some(collapsed),
        }
    }
}

/// Capabilities the organizer needs from the browser.
///
/// Calls taking several tab ids are all-or-nothing: one unknown id rejects
/// the whole call. Queries against a window that no longer exists return an
/// empty list rather than an error.
#[async_trait::async_trait]
pub trait TabHost: Send + Sync {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<Tab>, HostError>;
    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError>;
    /// Appends the tabs to the end of the window, leaving any group.
    async fn move_tabs(&self, tab_ids: &[TabId], window_id: WindowId) -> Result<(), HostError>;
    /// Adds tabs to an existing group, moving them into its window if needed.
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: GroupId) -> Result<(), HostError>;
    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError>;
    /// Creates an untitled, expanded group holding the tabs.
    async fn create_group(
        &self,
        window_id: WindowId,
        tab_ids: &[TabId],
    ) -> Result<GroupId, HostError>;
    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate)
        -> Result<Group, HostError>;
    async fn get_group(&self, group_id: GroupId) -> Result<Group, HostError>;
    /// Groups of a window in creation order. Groups left without tabs are
    /// discarded by the host.
    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<Group>, HostError>;
    async fn get_window(&self, window_id: WindowId) -> Result<Window, HostError>;
    async fn current_window(&self) -> Result<Window, HostError>;
    async fn list_windows(&self) -> Result<Vec<Window>, HostError>;
    /// Opens a normal, unfocused window. The host may seed it with a blank tab.
    async fn create_window(&self) -> Result<Window, HostError>;
    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError>;
    async fn remove_window(&self, window_id: WindowId) -> Result<(), HostError>;
}
