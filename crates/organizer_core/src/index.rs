use std::collections::BTreeMap;

use crate::{Category, TabId};

/// Per-session mapping from live tab identity to its resolved category.
///
/// Entries must be removed when the tab closes: the host may hand the same
/// identity to an unrelated tab later on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabCategoryIndex {
    entries: BTreeMap<TabId, Category>,
}

impl TabCategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entries: BTreeMap<TabId, Category>) -> Self {
        Self { entries }
    }

    pub fn set(&mut self, tab_id: TabId, category: Category) {
        self.entries.insert(tab_id, category);
    }

    /// Category for the tab, `Uncategorized` when absent.
    pub fn get(&self, tab_id: TabId) -> Category {
        self.entries
            .get(&tab_id)
            .cloned()
            .unwrap_or_else(Category::uncategorized)
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.entries.contains_key(&tab_id)
    }

    pub fn remove(&mut self, tab_id: TabId) -> Option<Category> {
        self.entries.remove(&tab_id)
    }

    /// Keeps only the entries whose tab passes `keep`; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(TabId) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|tab_id, _| keep(*tab_id));
        before - self.entries.len()
    }

    pub fn snapshot(&self) -> BTreeMap<TabId, Category> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
