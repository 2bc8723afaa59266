//! Keeps browser tab groups in line with the category index.
//!
//! Every operation re-reads live host state before acting and treats each
//! host call as fallible on its own: a tab, group or window that vanished in
//! the meantime is logged and skipped while the rest of the batch carries on.
//! Nothing is rolled back.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use organizer_core::plan::{
    duplicate_group_merges, is_placeholder_tab, newest_duplicates, plan_combine, stale_members,
    tabs_in_category,
};
use organizer_core::{
    Category, CategoryOverview, Group, GroupId, TabCategoryIndex, TabId, Window, WindowId,
};
use organizer_logging::{organizer_debug, organizer_info, organizer_warn};

use crate::host::{GroupUpdate, TabHost, TabQuery};
use crate::{HostError, ReconcileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TabOp {
    Move(WindowId),
    Join(GroupId),
    Ungroup,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeparateReport {
    pub moved: usize,
    pub window_id: Option<WindowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CombineReport {
    pub tabs_moved: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReport {
    pub group: Group,
    pub evicted: Vec<TabId>,
}

pub struct GroupReconciler {
    host: Arc<dyn TabHost>,
}

impl GroupReconciler {
    pub fn new(host: Arc<dyn TabHost>) -> Self {
        Self { host }
    }

    /// Gathers every tab of each requested category into exactly one
    /// collapsed group titled with the category. Unrequested categories are
    /// left alone.
    pub async fn group_by_category(
        &self,
        window_id: WindowId,
        categories: &[Category],
        index: &TabCategoryIndex,
    ) -> Result<usize, ReconcileError> {
        let categories = requested(categories)?;
        self.normal_window(window_id).await?;
        let tabs = self.host.query_tabs(&TabQuery::in_window(window_id)).await?;
        let groups = self.host.query_groups(window_id).await?;

        let mut grouped = 0;
        for category in categories {
            let members: Vec<TabId> = tabs_in_category(&tabs, index, category)
                .into_iter()
                .map(|tab| tab.id)
                .collect();
            if members.is_empty() {
                continue;
            }
            organizer_debug!("Found {} tabs in category {}", members.len(), category);

            let titled: Vec<&Group> = groups
                .iter()
                .filter(|group| category.matches_title(&group.title))
                .collect();
            match titled.first() {
                Some(survivor) => {
                    let joined = self.apply_each(TabOp::Join(survivor.id), &members).await;
                    let strangers: Vec<TabId> = tabs
                        .iter()
                        .filter(|tab| {
                            tab.group_id
                                .is_some_and(|gid| titled.iter().any(|group| group.id == gid))
                                && !members.contains(&tab.id)
                        })
                        .map(|tab| tab.id)
                        .collect();
                    self.apply_each(TabOp::Ungroup, &strangers).await;
                    self.set_collapsed(survivor.id, true).await;
                    grouped += joined.len();
                }
                None => {
                    if let Some((_, count)) = self
                        .create_titled_group(window_id, &members, category)
                        .await
                    {
                        grouped += count;
                    }
                }
            }
        }

        organizer_info!("{} tabs grouped in window {}", grouped, window_id);
        Ok(grouped)
    }

    /// Dissolves the groups titled with any requested category.
    pub async fn ungroup_by_category(
        &self,
        window_id: WindowId,
        categories: &[Category],
    ) -> Result<usize, ReconcileError> {
        let categories = requested(categories)?;
        self.normal_window(window_id).await?;
        let groups = self.host.query_groups(window_id).await?;

        let mut ungrouped = 0;
        for group in groups
            .iter()
            .filter(|group| categories.iter().any(|c| c.matches_title(&group.title)))
        {
            let members = match self.group_members(group.id).await {
                Ok(members) => members,
                Err(err) => {
                    organizer_warn!("Skipping group {} ({}): {}", group.id, group.title, err);
                    continue;
                }
            };
            ungrouped += self.apply_each(TabOp::Ungroup, &members).await.len();
        }
        organizer_info!("{} tabs ungrouped in window {}", ungrouped, window_id);
        Ok(ungrouped)
    }

    pub async fn ungroup_all(&self, window_id: WindowId) -> Result<usize, ReconcileError> {
        self.normal_window(window_id).await?;
        let grouped: Vec<TabId> = self
            .host
            .query_tabs(&TabQuery::in_window(window_id))
            .await?
            .into_iter()
            .filter(|tab| tab.group_id.is_some())
            .map(|tab| tab.id)
            .collect();
        let ungrouped = self.apply_each(TabOp::Ungroup, &grouped).await.len();
        organizer_info!("All {} grouped tabs in window {} ungrouped", ungrouped, window_id);
        Ok(ungrouped)
    }

    /// Moves the requested categories into a fresh window, grouped per
    /// category, then tidies both windows.
    pub async fn separate_into_new_window(
        &self,
        window_id: WindowId,
        categories: &[Category],
        index: &TabCategoryIndex,
    ) -> Result<SeparateReport, ReconcileError> {
        let categories = requested(categories)?;
        self.normal_window(window_id).await?;
        let tabs = self.host.query_tabs(&TabQuery::in_window(window_id)).await?;

        let to_move: Vec<TabId> = tabs
            .iter()
            .filter(|tab| {
                let category = index.get(tab.id);
                categories.iter().any(|wanted| **wanted == category)
            })
            .map(|tab| tab.id)
            .collect();
        if to_move.is_empty() {
            organizer_info!("No tabs to move out of window {}", window_id);
            return Ok(SeparateReport::default());
        }

        let new_window = self.host.create_window().await?;
        let moved = self.apply_each(TabOp::Move(new_window.id), &to_move).await;

        for category in &categories {
            let members: Vec<TabId> = moved
                .iter()
                .copied()
                .filter(|id| index.get(*id) == **category)
                .collect();
            if !members.is_empty() {
                self.create_titled_group(new_window.id, &members, category)
                    .await;
            }
        }

        if !moved.is_empty() {
            self.remove_placeholders(new_window.id, &moved).await;
        }
        self.collapse_all(new_window.id).await;
        self.collapse_all(window_id).await;
        if let Err(err) = self.host.focus_window(new_window.id).await {
            organizer_warn!("Could not focus window {}: {}", new_window.id, err);
        }

        organizer_info!(
            "Moved {} tabs from window {} to new window {}",
            moved.len(),
            window_id,
            new_window.id
        );
        Ok(SeparateReport {
            moved: moved.len(),
            window_id: Some(new_window.id),
        })
    }

    /// Folds every normal window into the first one, grouping by category.
    ///
    /// With `remove_duplicates`, a URL already seen closes later copies that
    /// live outside the target window. Copies that share the target window are
    /// left open.
    pub async fn combine_all_windows(
        &self,
        remove_duplicates: bool,
        index: &TabCategoryIndex,
    ) -> Result<CombineReport, ReconcileError> {
        let windows = self.host.list_windows().await?;
        if windows.len() <= 1 {
            return Err(ReconcileError::NothingToCombine);
        }
        let normal: Vec<&Window> = windows.iter().filter(|w| w.kind.is_normal()).collect();
        let Some(target) = normal.first().map(|w| w.id) else {
            return Err(ReconcileError::NoNormalWindow);
        };
        if normal.len() <= 1 {
            return Err(ReconcileError::NothingToCombine);
        }

        let mut tabs = Vec::new();
        for window in &normal {
            match self.host.query_tabs(&TabQuery::in_window(window.id)).await {
                Ok(window_tabs) => tabs.extend(window_tabs),
                Err(err) => organizer_warn!("Skipping window {}: {}", window.id, err),
            }
        }

        let mut existing: BTreeMap<String, GroupId> = BTreeMap::new();
        for group in self.host.query_groups(target).await? {
            existing.entry(group.title).or_insert(group.id);
        }

        let plan = plan_combine(&tabs, target, remove_duplicates, index);
        let removed = self.apply_each(TabOp::Close, &plan.duplicates).await;

        let mut tabs_moved = 0;
        for bucket in &plan.buckets {
            let moved = self.apply_each(TabOp::Move(target), &bucket.to_move).await;
            tabs_moved += moved.len();
            let members: Vec<TabId> = bucket
                .tab_ids
                .iter()
                .copied()
                .filter(|id| !bucket.to_move.contains(id) || moved.contains(id))
                .collect();
            if members.is_empty() {
                continue;
            }
            match existing.get(bucket.category.as_str()) {
                Some(group_id) => {
                    self.apply_each(TabOp::Join(*group_id), &members).await;
                }
                None => {
                    if let Some((group_id, _)) = self
                        .create_titled_group(target, &members, &bucket.category)
                        .await
                    {
                        existing.insert(bucket.category.to_string(), group_id);
                    }
                }
            }
        }

        for window in normal.iter().skip(1) {
            match self.host.remove_window(window.id).await {
                Ok(()) => {}
                Err(HostError::WindowNotFound(_)) => {
                    organizer_debug!("Window {} already closed", window.id);
                }
                Err(err) => organizer_warn!("Failed to close window {}: {}", window.id, err),
            }
        }

        if let Err(err) = self.merge_duplicate_groups(target).await {
            organizer_warn!("Merging groups in window {} failed: {}", target, err);
        }
        self.collapse_all(target).await;

        organizer_info!(
            "Combined windows into {}: {} moved, {} duplicates removed",
            target,
            tabs_moved,
            removed.len()
        );
        Ok(CombineReport {
            tabs_moved,
            duplicates_removed: removed.len(),
        })
    }

    /// Moves tabs from every other normal window into the first one without
    /// grouping. A non-empty `categories` restricts the move to those categories.
    pub async fn combine_tabs(
        &self,
        categories: &[Category],
        index: &TabCategoryIndex,
    ) -> Result<usize, ReconcileError> {
        let windows: Vec<Window> = self
            .host
            .list_windows()
            .await?
            .into_iter()
            .filter(|w| w.kind.is_normal())
            .collect();
        if windows.len() <= 1 && categories.is_empty() {
            return Err(ReconcileError::NothingToCombine);
        }
        let Some(target) = windows.first().map(|w| w.id) else {
            return Err(ReconcileError::NoNormalWindow);
        };

        let mut to_move = Vec::new();
        for window in windows.iter().skip(1) {
            let window_tabs = match self.host.query_tabs(&TabQuery::in_window(window.id)).await {
                Ok(tabs) => tabs,
                Err(err) => {
                    organizer_warn!("Skipping window {}: {}", window.id, err);
                    continue;
                }
            };
            to_move.extend(
                window_tabs
                    .iter()
                    .filter(|tab| categories.is_empty() || categories.contains(&index.get(tab.id)))
                    .map(|tab| tab.id),
            );
        }

        let moved = self.apply_each(TabOp::Move(target), &to_move).await.len();
        organizer_info!("Moved {} tabs into window {}", moved, target);
        Ok(moved)
    }

    /// Folds same-titled groups into the first of them. Returns how many
    /// groups were absorbed; a second run right after returns zero.
    pub async fn merge_duplicate_groups(&self, window_id: WindowId) -> Result<usize, ReconcileError> {
        self.normal_window(window_id).await?;
        let groups = self.host.query_groups(window_id).await?;

        let mut absorbed = 0;
        for merge in duplicate_group_merges(&groups) {
            for group_id in &merge.absorbed {
                let members = match self.group_members(*group_id).await {
                    Ok(members) => members,
                    Err(err) => {
                        organizer_warn!("Skipping group {}: {}", group_id, err);
                        continue;
                    }
                };
                self.apply_each(TabOp::Join(merge.survivor), &members).await;
                absorbed += 1;
            }
            organizer_debug!(
                "Merged {} group(s) titled {} into {}",
                merge.absorbed.len(),
                merge.title,
                merge.survivor
            );
        }
        Ok(absorbed)
    }

    /// Sets a group's collapsed state, then evicts members whose indexed
    /// category no longer matches the group title.
    pub async fn set_group_collapsed(
        &self,
        group_id: GroupId,
        collapsed: bool,
        index: &TabCategoryIndex,
    ) -> Result<ToggleReport, ReconcileError> {
        let group = self
            .host
            .update_group(group_id, &GroupUpdate::collapsed(collapsed))
            .await?;
        let evicted = match self.host.query_tabs(&TabQuery::in_group(group_id)).await {
            Ok(members) => {
                let stale = stale_members(&group.title, &members, index);
                self.apply_each(TabOp::Ungroup, &stale).await
            }
            Err(err) => {
                organizer_warn!("Could not check members of group {}: {}", group_id, err);
                Vec::new()
            }
        };
        if !evicted.is_empty() {
            organizer_info!(
                "Evicted {} stale tab(s) from group {} ({})",
                evicted.len(),
                group_id,
                group.title
            );
        }
        Ok(ToggleReport { group, evicted })
    }

    /// Flips a group's collapsed state (with the same membership check).
    pub async fn toggle_group(
        &self,
        group_id: GroupId,
        index: &TabCategoryIndex,
    ) -> Result<ToggleReport, ReconcileError> {
        let group = self.host.get_group(group_id).await?;
        self.set_group_collapsed(group_id, !group.collapsed, index)
            .await
    }

    /// Closes every tab whose URL also belongs to a newer tab in the window.
    pub async fn remove_duplicate_tabs(&self, window_id: WindowId) -> Result<usize, ReconcileError> {
        self.existing_window(window_id).await?;
        let tabs = self.host.query_tabs(&TabQuery::in_window(window_id)).await?;
        let duplicates = newest_duplicates(&tabs);
        let removed = self.apply_each(TabOp::Close, &duplicates).await.len();
        organizer_info!("Removed {} duplicate tab(s) from window {}", removed, window_id);
        Ok(removed)
    }

    /// Adds a freshly classified tab to a same-titled group, if the window has one.
    /// Never creates a group.
    pub async fn join_matching_group(
        &self,
        tab_id: TabId,
        window_id: WindowId,
        category: &Category,
    ) -> Result<Option<GroupId>, ReconcileError> {
        let window = self.existing_window(window_id).await?;
        if !window.kind.is_normal() {
            return Ok(None);
        }
        let groups = self.host.query_groups(window_id).await?;
        let Some(group) = groups.iter().find(|g| category.matches_title(&g.title)) else {
            organizer_debug!("No {} group in window {} yet", category, window_id);
            return Ok(None);
        };
        let joined = self.apply_each(TabOp::Join(group.id), &[tab_id]).await;
        Ok((!joined.is_empty()).then_some(group.id))
    }

    /// Category counts and groups for a window, falling back to the current
    /// window when the given one is gone.
    pub async fn overview(
        &self,
        window_id: WindowId,
        index: &TabCategoryIndex,
    ) -> Result<CategoryOverview, ReconcileError> {
        let window = match self.host.get_window(window_id).await {
            Ok(window) => window,
            Err(err) => {
                organizer_debug!("Window {} unavailable ({}); using current window", window_id, err);
                self.host.current_window().await?
            }
        };
        let tabs = self.host.query_tabs(&TabQuery::in_window(window.id)).await?;
        let groups = self.host.query_groups(window.id).await?;
        let window_count = self.host.list_windows().await?.len();
        Ok(CategoryOverview::build(&tabs, &groups, index, window_count))
    }

    /// Tab count per group title. Groups sharing a title are reported as one
    /// entry holding their combined count.
    pub async fn grouped_tab_counts(
        &self,
        window_id: WindowId,
    ) -> Result<BTreeMap<String, usize>, ReconcileError> {
        let groups = self.host.query_groups(window_id).await?;
        let mut counts = BTreeMap::new();
        for group in groups {
            match self.group_members(group.id).await {
                Ok(members) => *counts.entry(group.title).or_insert(0) += members.len(),
                Err(err) => organizer_warn!("Skipping group {}: {}", group.id, err),
            }
        }
        Ok(counts)
    }

    async fn existing_window(&self, window_id: WindowId) -> Result<Window, ReconcileError> {
        self.host.get_window(window_id).await.map_err(|err| match err {
            HostError::WindowNotFound(id) => ReconcileError::WindowNotFound(id),
            other => ReconcileError::Host(other),
        })
    }

    async fn normal_window(&self, window_id: WindowId) -> Result<Window, ReconcileError> {
        let window = self.existing_window(window_id).await?;
        if !window.kind.is_normal() {
            return Err(ReconcileError::NotNormalWindow {
                window_id,
                kind: window.kind,
            });
        }
        Ok(window)
    }

    async fn group_members(&self, group_id: GroupId) -> Result<Vec<TabId>, HostError> {
        Ok(self
            .host
            .query_tabs(&TabQuery::in_group(group_id))
            .await?
            .into_iter()
            .map(|tab| tab.id)
            .collect())
    }

    async fn run(&self, op: TabOp, tab_ids: &[TabId]) -> Result<(), HostError> {
        match op {
            TabOp::Move(window_id) => self.host.move_tabs(tab_ids, window_id).await,
            TabOp::Join(group_id) => self.host.group_tabs(tab_ids, group_id).await,
            TabOp::Ungroup => self.host.ungroup_tabs(tab_ids).await,
            TabOp::Close => self.host.remove_tabs(tab_ids).await,
        }
    }

    /// Applies `op` to all tabs at once; if the host rejects the batch, falls
    /// back to one call per tab. Returns the tabs the operation succeeded for.
    async fn apply_each(&self, op: TabOp, tab_ids: &[TabId]) -> Vec<TabId> {
        if tab_ids.is_empty() {
            return Vec::new();
        }
        match self.run(op, tab_ids).await {
            Ok(()) => tab_ids.to_vec(),
            Err(err) => {
                organizer_warn!(
                    "{:?} rejected for {} tab(s): {}; retrying one by one",
                    op,
                    tab_ids.len(),
                    err
                );
                let mut applied = Vec::with_capacity(tab_ids.len());
                for id in tab_ids {
                    match self.run(op, &[*id]).await {
                        Ok(()) => applied.push(*id),
                        Err(err) => organizer_warn!("Skipping tab {} for {:?}: {}", id, op, err),
                    }
                }
                applied
            }
        }
    }

    /// Creates a collapsed group titled `category`. Returns the group and how
    /// many tabs made it in, or `None` when no tab could be grouped.
    async fn create_titled_group(
        &self,
        window_id: WindowId,
        tab_ids: &[TabId],
        category: &Category,
    ) -> Option<(GroupId, usize)> {
        let (group_id, members) = match self.host.create_group(window_id, tab_ids).await {
            Ok(group_id) => (group_id, tab_ids.len()),
            Err(err) => {
                organizer_warn!(
                    "Grouping {} tab(s) as {} failed: {}; retrying with live tabs",
                    tab_ids.len(),
                    category,
                    err
                );
                let live: HashSet<TabId> = match self.host.query_tabs(&TabQuery::all()).await {
                    Ok(tabs) => tabs.into_iter().map(|tab| tab.id).collect(),
                    Err(err) => {
                        organizer_warn!("Could not list tabs: {}", err);
                        return None;
                    }
                };
                let survivors: Vec<TabId> = tab_ids
                    .iter()
                    .copied()
                    .filter(|id| live.contains(id))
                    .collect();
                if survivors.is_empty() {
                    return None;
                }
                match self.host.create_group(window_id, &survivors).await {
                    Ok(group_id) => (group_id, survivors.len()),
                    Err(err) => {
                        organizer_warn!("Giving up on group {}: {}", category, err);
                        return None;
                    }
                }
            }
        };

        if let Err(err) = self
            .host
            .update_group(group_id, &GroupUpdate::titled(category.as_str(), true))
            .await
        {
            organizer_warn!("Could not title group {} as {}: {}", group_id, category, err);
        }
        organizer_debug!("Created group {} for {} with {} tab(s)", group_id, category, members);
        Some((group_id, members))
    }

    async fn set_collapsed(&self, group_id: GroupId, collapsed: bool) {
        if let Err(err) = self
            .host
            .update_group(group_id, &GroupUpdate::collapsed(collapsed))
            .await
        {
            organizer_warn!("Could not update group {}: {}", group_id, err);
        }
    }

    async fn collapse_all(&self, window_id: WindowId) {
        let groups = match self.host.query_groups(window_id).await {
            Ok(groups) => groups,
            Err(err) => {
                organizer_warn!("Could not list groups of window {}: {}", window_id, err);
                return;
            }
        };
        for group in groups.iter().filter(|group| !group.collapsed) {
            self.set_collapsed(group.id, true).await;
        }
    }

    /// Closes the blank tab(s) the host opened along with a new window.
    async fn remove_placeholders(&self, window_id: WindowId, keep: &[TabId]) {
        let placeholders: Vec<TabId> = match self
            .host
            .query_tabs(&TabQuery::in_window(window_id))
            .await
        {
            Ok(tabs) => tabs
                .iter()
                .filter(|tab| is_placeholder_tab(tab) && !keep.contains(&tab.id))
                .map(|tab| tab.id)
                .collect(),
            Err(err) => {
                organizer_warn!("Could not list tabs of window {}: {}", window_id, err);
                return;
            }
        };
        self.apply_each(TabOp::Close, &placeholders).await;
    }
}

/// The requested categories without repeats, or an error when none were given.
fn requested(categories: &[Category]) -> Result<Vec<&Category>, ReconcileError> {
    let mut seen = HashSet::new();
    let unique: Vec<&Category> = categories.iter().filter(|c| seen.insert(*c)).collect();
    if unique.is_empty() {
        return Err(ReconcileError::NoCategories);
    }
    Ok(unique)
}
