use crate::{Category, Generation, Tab, TabId, WindowId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Classify { tab: Tab, generation: Generation },
    ClassifyBatch { tabs: Vec<(Tab, Generation)> },
    PersistIndex,
    /// Add the tab to an existing group titled `category`, if the window has one.
    JoinMatchingGroup {
        tab_id: TabId,
        window_id: WindowId,
        category: Category,
    },
    NotifyRefresh,
}
