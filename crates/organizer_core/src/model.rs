use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-assigned tab identity. Only stable while the tab lives.
pub type TabId = u64;
pub type WindowId = u64;
pub type GroupId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Normal,
    Popup,
    Panel,
    App,
    Devtools,
}

impl WindowKind {
    /// Only normal windows are eligible for grouping operations.
    pub fn is_normal(self) -> bool {
        matches!(self, WindowKind::Normal)
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowKind::Normal => "normal",
            WindowKind::Popup => "popup",
            WindowKind::Panel => "panel",
            WindowKind::App => "app",
            WindowKind::Devtools => "devtools",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub id: WindowId,
    #[serde(default)]
    pub kind: WindowKind,
    #[serde(default)]
    pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub window_id: WindowId,
    pub title: String,
    pub collapsed: bool,
}
