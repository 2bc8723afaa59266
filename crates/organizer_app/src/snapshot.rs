//! Seeds the in-memory browser from a RON description of open windows.
//!
//! ```ron
//! (windows: [
//!     (kind: normal, tabs: [
//!         (url: "https://doc.rust-lang.org/", title: "Rust", group: Some("Work")),
//!     ]),
//! ])
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use organizer_core::{TabId, WindowKind};
use organizer_engine::InMemoryHost;
use organizer_logging::organizer_info;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostSnapshot {
    pub windows: Vec<WindowSnapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WindowSnapshot {
    pub kind: WindowKind,
    pub tabs: Vec<TabSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Title of the group the tab starts in.
    #[serde(default)]
    pub group: Option<String>,
}

pub fn load(path: &Path) -> Result<HostSnapshot> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading snapshot {path:?}"))?;
    ron::from_str(&content).with_context(|| format!("parsing snapshot {path:?}"))
}

/// Builds a host holding the snapshot's windows, or a single empty normal
/// window when there is nothing to restore.
pub fn seed_host(snapshot: &HostSnapshot) -> Result<InMemoryHost> {
    let host = InMemoryHost::new();
    if snapshot.windows.is_empty() {
        host.add_window(WindowKind::Normal);
        return Ok(host);
    }

    let mut tab_count = 0;
    for window in &snapshot.windows {
        let window_id = host.add_window(window.kind);
        let mut groups: BTreeMap<&str, Vec<TabId>> = BTreeMap::new();
        for tab in &window.tabs {
            let tab_id = host.add_tab(window_id, tab.url.as_str(), tab.title.as_str())?;
            if let Some(title) = tab.group.as_deref() {
                groups.entry(title).or_default().push(tab_id);
            }
            tab_count += 1;
        }
        for (title, tab_ids) in groups {
            host.add_group(window_id, title, &tab_ids)
                .with_context(|| format!("grouping {title} in window {window_id}"))?;
        }
    }
    organizer_info!(
        "Seeded {} windows with {} tabs",
        snapshot.windows.len(),
        tab_count
    );
    Ok(host)
}
