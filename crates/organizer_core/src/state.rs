use std::collections::{BTreeMap, BTreeSet};

use crate::{Category, TabCategoryIndex, TabId};

/// Identifies one classification request for a tab. A newer load of the
/// same tab id supersedes any older generation still in flight.
pub type Generation = u64;

/// Lifecycle state: the live index plus the tabs with a classification in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrganizerState {
    index: TabCategoryIndex,
    pending: BTreeMap<TabId, Generation>,
    next_generation: Generation,
}

impl OrganizerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &TabCategoryIndex {
        &self.index
    }

    pub fn is_pending(&self, tab_id: TabId) -> bool {
        self.pending.contains_key(&tab_id)
    }

    /// Starts a new classification for the tab and returns its generation.
    pub(crate) fn mark_pending(&mut self, tab_id: TabId) -> Generation {
        self.next_generation += 1;
        self.pending.insert(tab_id, self.next_generation);
        self.next_generation
    }

    /// Records a finished classification. Returns false when the tab closed
    /// or loaded again while it was being classified; nothing is stored then.
    pub(crate) fn resolve(
        &mut self,
        tab_id: TabId,
        generation: Generation,
        category: Category,
    ) -> bool {
        if self.pending.get(&tab_id) != Some(&generation) {
            return false;
        }
        self.pending.remove(&tab_id);
        self.index.set(tab_id, category);
        true
    }

    pub(crate) fn forget(&mut self, tab_id: TabId) -> bool {
        self.pending.remove(&tab_id);
        self.index.remove(tab_id).is_some()
    }

    /// Drops every index entry whose tab is not in `keep`. Returns how many went.
    pub(crate) fn retain(&mut self, keep: &BTreeSet<TabId>) -> usize {
        self.index.retain(|tab_id| keep.contains(&tab_id))
    }

    pub(crate) fn replace_index(&mut self, index: TabCategoryIndex) {
        self.index = index;
    }
}
