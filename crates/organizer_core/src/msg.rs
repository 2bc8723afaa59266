use std::collections::BTreeMap;

use crate::{Category, Generation, Tab, TabId, WindowKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A tab finished loading in a window of the given kind.
    TabLoaded { tab: Tab, window_kind: WindowKind },
    /// The host closed a tab.
    TabRemoved(TabId),
    /// Classification finished for a single tab.
    TabClassified {
        tab: Tab,
        generation: Generation,
        category: Category,
    },
    /// Classify every tab currently open (startup scan). Index entries for
    /// tabs not in the list are dropped.
    ScanRequested(Vec<Tab>),
    /// Classification finished for a scan batch, one entry per tab.
    BatchClassified(Vec<(TabId, Generation, Category)>),
    /// Restore the index from persisted state.
    RestoreIndex(BTreeMap<TabId, Category>),
}
