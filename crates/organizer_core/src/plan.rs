//! Pure planning helpers for group reconciliation.
//!
//! Nothing here talks to the host; the engine feeds in snapshots of tabs and
//! groups and executes whatever these functions decide.
use std::collections::{BTreeMap, HashSet};

use url::Url;

use crate::{Category, Group, GroupId, Tab, TabCategoryIndex, TabId, WindowId};

const INTERNAL_SCHEMES: &[&str] = &[
    "chrome",
    "chrome-extension",
    "chrome-search",
    "chrome-untrusted",
    "devtools",
    "edge",
    "about",
];

/// URLs the host uses for the blank tab it opens in a fresh window.
pub const PLACEHOLDER_URLS: &[&str] = &["chrome://newtab/", "about:newtab", "about:blank"];

/// True when the URL points at real page content worth classifying.
pub fn is_classifiable_url(url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => !INTERNAL_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}

pub fn is_placeholder_tab(tab: &Tab) -> bool {
    PLACEHOLDER_URLS.contains(&tab.url.as_str())
}

pub fn tabs_in_category<'a>(
    tabs: &'a [Tab],
    index: &TabCategoryIndex,
    category: &Category,
) -> Vec<&'a Tab> {
    tabs.iter()
        .filter(|tab| index.get(tab.id) == *category)
        .collect()
}

pub fn category_counts(tabs: &[Tab], index: &TabCategoryIndex) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for tab in tabs {
        *counts.entry(index.get(tab.id)).or_insert(0) += 1;
    }
    counts
}

/// Group ids per title, in the order the groups were given.
pub fn groups_by_title(groups: &[Group]) -> BTreeMap<String, Vec<GroupId>> {
    let mut by_title: BTreeMap<String, Vec<GroupId>> = BTreeMap::new();
    for group in groups {
        by_title.entry(group.title.clone()).or_default().push(group.id);
    }
    by_title
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMerge {
    pub title: String,
    pub survivor: GroupId,
    pub absorbed: Vec<GroupId>,
}

/// For every title held by more than one group, the first group survives and
/// the others are absorbed into it. Empty when titles are already unique.
pub fn duplicate_group_merges(groups: &[Group]) -> Vec<GroupMerge> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_title: BTreeMap<&str, Vec<GroupId>> = BTreeMap::new();
    for group in groups {
        let ids = by_title.entry(group.title.as_str()).or_default();
        if ids.is_empty() {
            order.push(group.title.as_str());
        }
        ids.push(group.id);
    }

    order
        .into_iter()
        .filter_map(|title| {
            let ids = by_title.remove(title)?;
            let (survivor, absorbed) = ids.split_first()?;
            if absorbed.is_empty() {
                return None;
            }
            Some(GroupMerge {
                title: title.to_string(),
                survivor: *survivor,
                absorbed: absorbed.to_vec(),
            })
        })
        .collect()
}

/// Members of a group whose indexed category no longer matches its title.
pub fn stale_members(title: &str, members: &[Tab], index: &TabCategoryIndex) -> Vec<TabId> {
    members
        .iter()
        .filter(|tab| !index.get(tab.id).matches_title(title))
        .map(|tab| tab.id)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryBucket {
    pub category: Category,
    /// Every tab that should end up in the category's group.
    pub tab_ids: Vec<TabId>,
    /// The subset of `tab_ids` living outside the target window.
    pub to_move: Vec<TabId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CombinePlan {
    pub duplicates: Vec<TabId>,
    pub buckets: Vec<CategoryBucket>,
}

impl CombinePlan {
    pub fn tabs_to_move(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.to_move.len()).sum()
    }
}

/// Plans folding every tab into `target`, bucketed by indexed category.
///
/// Target-window tabs are visited first so their copy of a URL is the one
/// that survives deduplication. A duplicate is only scheduled for removal when
/// it lives outside the target window; repeated URLs already inside the target
/// are left open (and left out of the buckets).
pub fn plan_combine(
    tabs: &[Tab],
    target: WindowId,
    remove_duplicates: bool,
    index: &TabCategoryIndex,
) -> CombinePlan {
    let ordered = tabs
        .iter()
        .filter(|tab| tab.window_id == target)
        .chain(tabs.iter().filter(|tab| tab.window_id != target));

    let mut plan = CombinePlan::default();
    let mut seen: HashSet<&str> = HashSet::new();
    for tab in ordered {
        if remove_duplicates && seen.contains(tab.url.as_str()) {
            if tab.window_id != target {
                plan.duplicates.push(tab.id);
            }
            continue;
        }
        seen.insert(tab.url.as_str());

        let category = index.get(tab.id);
        let position = match plan
            .buckets
            .iter()
            .position(|bucket| bucket.category == category)
        {
            Some(position) => position,
            None => {
                plan.buckets.push(CategoryBucket {
                    category,
                    tab_ids: Vec::new(),
                    to_move: Vec::new(),
                });
                plan.buckets.len() - 1
            }
        };
        let bucket = &mut plan.buckets[position];
        bucket.tab_ids.push(tab.id);
        if tab.window_id != target {
            bucket.to_move.push(tab.id);
        }
    }
    plan
}

/// Tabs to close so each URL keeps only its most recently created tab
/// (the highest identity).
pub fn newest_duplicates(tabs: &[Tab]) -> Vec<TabId> {
    let mut sorted: Vec<&Tab> = tabs.iter().collect();
    sorted.sort_by(|a, b| b.id.cmp(&a.id));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates = Vec::new();
    for tab in sorted {
        if !seen.insert(tab.url.as_str()) {
            duplicates.push(tab.id);
        }
    }
    duplicates
}
