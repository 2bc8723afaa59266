use std::collections::BTreeSet;

use organizer_logging::organizer_debug;

use crate::plan::is_classifiable_url;
use crate::{Effect, Msg, OrganizerState, TabCategoryIndex, TabId};

/// Pure update function: applies a lifecycle message to state and returns any effects.
pub fn update(mut state: OrganizerState, msg: Msg) -> (OrganizerState, Vec<Effect>) {
    let effects = match msg {
        Msg::TabLoaded { tab, window_kind } => {
            if !is_classifiable_url(&tab.url) {
                organizer_debug!("Skipping tab {} (internal or empty page)", tab.id);
                return (state, Vec::new());
            }
            if !window_kind.is_normal() {
                organizer_debug!("Skipping tab {} ({} window)", tab.id, window_kind);
                return (state, Vec::new());
            }
            let generation = state.mark_pending(tab.id);
            vec![Effect::Classify { tab, generation }]
        }
        Msg::TabClassified {
            tab,
            generation,
            category,
        } => {
            if state.resolve(tab.id, generation, category.clone()) {
                vec![
                    Effect::PersistIndex,
                    Effect::JoinMatchingGroup {
                        tab_id: tab.id,
                        window_id: tab.window_id,
                        category,
                    },
                    Effect::NotifyRefresh,
                ]
            } else {
                organizer_debug!(
                    "Discarding category {} for tab {} (closed or reloaded during classification)",
                    category,
                    tab.id
                );
                Vec::new()
            }
        }
        Msg::ScanRequested(tabs) => {
            let tabs: Vec<_> = tabs
                .into_iter()
                .filter(|tab| is_classifiable_url(&tab.url))
                .collect();
            let live: BTreeSet<TabId> = tabs.iter().map(|tab| tab.id).collect();
            let mut effects = Vec::new();
            let dropped = state.retain(&live);
            if dropped > 0 {
                organizer_debug!("Dropped {} index entries for tabs no longer open", dropped);
                effects.push(Effect::PersistIndex);
            }
            if !tabs.is_empty() {
                let tabs = tabs
                    .into_iter()
                    .map(|tab| {
                        let generation = state.mark_pending(tab.id);
                        (tab, generation)
                    })
                    .collect();
                effects.push(Effect::ClassifyBatch { tabs });
            }
            effects
        }
        Msg::BatchClassified(results) => {
            let mut stored = 0usize;
            for (tab_id, generation, category) in results {
                if state.resolve(tab_id, generation, category) {
                    stored += 1;
                }
            }
            if stored == 0 {
                Vec::new()
            } else {
                vec![Effect::PersistIndex, Effect::NotifyRefresh]
            }
        }
        Msg::TabRemoved(tab_id) => {
            if state.forget(tab_id) {
                vec![Effect::PersistIndex]
            } else {
                Vec::new()
            }
        }
        Msg::RestoreIndex(entries) => {
            state.replace_index(TabCategoryIndex::from_snapshot(entries));
            Vec::new()
        }
    };

    (state, effects)
}
