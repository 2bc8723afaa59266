use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plan::{category_counts, groups_by_title};
use crate::{Category, Group, GroupId, Tab, TabCategoryIndex};

/// What the popup shows for one window: tab counts per category, the groups
/// already present per title, and how many windows are open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOverview {
    pub categories: BTreeMap<Category, usize>,
    pub grouped_tabs: BTreeMap<String, Vec<GroupId>>,
    pub window_count: usize,
}

impl CategoryOverview {
    pub fn build(
        tabs: &[Tab],
        groups: &[Group],
        index: &TabCategoryIndex,
        window_count: usize,
    ) -> Self {
        Self {
            categories: category_counts(tabs, index),
            grouped_tabs: groups_by_title(groups),
            window_count,
        }
    }
}
