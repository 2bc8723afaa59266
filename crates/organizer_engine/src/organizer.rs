//! Turns popup requests and tab lifecycle notifications into calls against
//! the classifier, the index and the reconciler.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use organizer_core::{
    update, Category, Effect, Msg, OrganizerState, Tab, TabCategoryIndex, TabId, WindowId,
};
use organizer_logging::{organizer_debug, organizer_info, organizer_warn};

use crate::batch::{BatchClassifier, BatchSettings};
use crate::cache::CategoryCache;
use crate::classify::{Classifier, RetryPolicy};
use crate::host::{TabHost, TabQuery};
use crate::protocol::{
    parse_request, OrganizeOption, OrganizeOutcome, Outcome, Request, Response, ToggleOutcome,
};
use crate::reconcile::GroupReconciler;
use crate::service::ClassificationService;
use crate::store::StateStore;
use crate::ReconcileError;

#[derive(Debug, Clone, Default)]
pub struct OrganizerSettings {
    pub retry: RetryPolicy,
    pub batch: BatchSettings,
}

pub struct Organizer {
    host: Arc<dyn TabHost>,
    store: Arc<StateStore>,
    cache: CategoryCache,
    classifier: Arc<Classifier>,
    batch: BatchClassifier,
    reconciler: GroupReconciler,
    state: Mutex<OrganizerState>,
}

impl Organizer {
    pub fn new(
        host: Arc<dyn TabHost>,
        service: Arc<dyn ClassificationService>,
        store: Arc<StateStore>,
        settings: OrganizerSettings,
    ) -> Self {
        let cache = CategoryCache::new(store.clone());
        let classifier = Arc::new(Classifier::new(service, cache.clone(), settings.retry));
        let batch = BatchClassifier::new(classifier.clone(), settings.batch);
        let reconciler = GroupReconciler::new(host.clone());

        let (state, _) = update(
            OrganizerState::new(),
            Msg::RestoreIndex(store.tab_categories()),
        );
        organizer_info!("Organizer ready with {} indexed tabs", state.index().len());

        Self {
            host,
            store,
            cache,
            classifier,
            batch,
            reconciler,
            state: Mutex::new(state),
        }
    }

    pub fn cache(&self) -> &CategoryCache {
        &self.cache
    }

    pub fn index(&self) -> TabCategoryIndex {
        self.lock().index().clone()
    }

    /// Reads and clears the flag telling the popup to redraw.
    pub fn take_refresh_flag(&self) -> bool {
        self.store.take_needs_refresh()
    }

    pub async fn handle_json(&self, raw: &str) -> Response {
        match parse_request(raw) {
            Ok(request) => self.handle(request).await,
            Err(response) => {
                organizer_warn!("Rejected request: {}", raw);
                response
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        organizer_debug!("Handling {:?}", request);
        match request {
            Request::GetCategoryList { window_id } => {
                match self.reconciler.overview(window_id, &self.index()).await {
                    Ok(overview) => Response::Overview(overview),
                    Err(err) => Response::error(err.to_string()),
                }
            }
            Request::OrganizeTabs {
                window_id,
                option,
                categories,
            } => self.organize(window_id, option, &categories).await,
            Request::CombineAllWindows { remove_duplicates } => {
                let result = self
                    .reconciler
                    .combine_all_windows(remove_duplicates, &self.index())
                    .await;
                Response::Outcome(self.finish(result.map(|report| {
                    let mut message = format!(
                        "All windows combined successfully. {} tab(s) moved.",
                        report.tabs_moved
                    );
                    if report.duplicates_removed > 0 {
                        message.push_str(&format!(
                            " {} duplicate tab(s) removed.",
                            report.duplicates_removed
                        ));
                    }
                    message
                })))
            }
            Request::CombineTabs { categories } => {
                let result = self
                    .reconciler
                    .combine_tabs(&categories, &self.index())
                    .await;
                Response::Outcome(self.finish(result.map(|_| {
                    if categories.is_empty() {
                        "All tabs combined into one window".to_string()
                    } else {
                        "Tabs from selected categories combined into one window".to_string()
                    }
                })))
            }
            Request::GetGroupedTabs { window_id } => {
                match self.reconciler.grouped_tab_counts(window_id).await {
                    Ok(counts) => Response::GroupedTabs(counts),
                    Err(err) => Response::error(err.to_string()),
                }
            }
            Request::GetTabCategories => Response::TabCategories(self.index().snapshot()),
            Request::ToggleGroupCollapse {
                group_id,
                collapsed,
            } => {
                let index = self.index();
                let result = match collapsed {
                    Some(collapsed) => {
                        self.reconciler
                            .set_group_collapsed(group_id, collapsed, &index)
                            .await
                    }
                    None => self.reconciler.toggle_group(group_id, &index).await,
                };
                Response::Toggle(match result {
                    Ok(report) => ToggleOutcome {
                        outcome: Outcome::ok(if report.group.collapsed {
                            "Group collapsed successfully"
                        } else {
                            "Group expanded successfully"
                        }),
                        group: Some(report.group),
                        evicted: report.evicted,
                    },
                    Err(err) => ToggleOutcome {
                        outcome: Outcome::failed(err.to_string()),
                        group: None,
                        evicted: Vec::new(),
                    },
                })
            }
            Request::RemoveDuplicates { window_id } => {
                let result = self.reconciler.remove_duplicate_tabs(window_id).await;
                Response::Outcome(
                    self.finish(result.map(|removed| format!("{removed} duplicate tab(s) removed."))),
                )
            }
            Request::TakeRefreshFlag => Response::Refresh {
                needs_refresh: self.take_refresh_flag(),
            },
        }
    }

    async fn organize(
        &self,
        window_id: WindowId,
        option: OrganizeOption,
        categories: &[Category],
    ) -> Response {
        let index = self.index();
        let result = match option {
            OrganizeOption::GroupTabs => self
                .reconciler
                .group_by_category(window_id, categories, &index)
                .await
                .map(|n| format!("{n} tabs were grouped.")),
            OrganizeOption::UngroupTabs => self
                .reconciler
                .ungroup_by_category(window_id, categories)
                .await
                .map(|n| format!("{n} tabs were ungrouped.")),
            OrganizeOption::SeparateWindows => self
                .reconciler
                .separate_into_new_window(window_id, categories, &index)
                .await
                .map(|report| format!("{} tabs were moved to a new window.", report.moved)),
            OrganizeOption::UngroupAllTabs => self
                .reconciler
                .ungroup_all(window_id)
                .await
                .map(|_| "All tabs were ungrouped.".to_string()),
        };

        let outcome = self.finish(result);
        let overview = if outcome.success {
            match self.reconciler.overview(window_id, &index).await {
                Ok(overview) => Some(overview),
                Err(err) => {
                    organizer_warn!("Could not refresh overview of window {}: {}", window_id, err);
                    None
                }
            }
        } else {
            None
        };
        Response::Organize(OrganizeOutcome { outcome, overview })
    }

    /// Converts a reconciler result into an outcome, raising the refresh flag
    /// when something ran.
    fn finish(&self, result: Result<String, ReconcileError>) -> Outcome {
        match result {
            Ok(message) => {
                self.store.mark_needs_refresh();
                organizer_info!("{}", message);
                Outcome::ok(message)
            }
            Err(err) => {
                organizer_warn!("Operation refused: {}", err);
                Outcome::failed(err.to_string())
            }
        }
    }

    /// A tab finished loading (or navigated); classifies it when eligible.
    pub async fn on_tab_loaded(&self, tab: Tab) {
        let effects = self.admit_tab_loaded(tab).await;
        self.drive(effects).await;
    }

    pub async fn on_tab_removed(&self, tab_id: TabId) {
        let effects = self.admit(Msg::TabRemoved(tab_id));
        self.drive(effects).await;
    }

    /// Classifies every open tab, as done once at startup. Index entries for
    /// tabs that are no longer open are dropped first.
    pub async fn categorize_all(&self) {
        let effects = self.admit_scan().await;
        self.drive(effects).await;
    }

    /// Applies a tab load to the state and returns the classification work it
    /// started, without running it.
    pub(crate) async fn admit_tab_loaded(&self, tab: Tab) -> Vec<Effect> {
        let window_kind = match self.host.get_window(tab.window_id).await {
            Ok(window) => window.kind,
            Err(err) => {
                organizer_debug!("Ignoring tab {}: {}", tab.id, err);
                return Vec::new();
            }
        };
        self.admit(Msg::TabLoaded { tab, window_kind })
    }

    pub(crate) async fn admit_scan(&self) -> Vec<Effect> {
        let tabs = match self.host.query_tabs(&TabQuery::all()).await {
            Ok(tabs) => tabs,
            Err(err) => {
                organizer_warn!("Initial scan failed: {}", err);
                return Vec::new();
            }
        };
        let mut eligible = Vec::with_capacity(tabs.len());
        for tab in tabs {
            match self.host.get_window(tab.window_id).await {
                Ok(window) if window.kind.is_normal() => eligible.push(tab),
                Ok(_) => {}
                Err(err) => organizer_debug!("Skipping tab {} in scan: {}", tab.id, err),
            }
        }
        organizer_info!("Scanning {} tabs", eligible.len());
        self.admit(Msg::ScanRequested(eligible))
    }

    /// Runs effects, feeding each follow-up message back through `update`.
    pub(crate) async fn drive(&self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            if let Some(next) = self.run_effect(effect).await {
                queue.extend(self.admit(next));
            }
        }
    }

    pub(crate) fn admit(&self, msg: Msg) -> Vec<Effect> {
        let mut state = self.lock();
        let (next, effects) = update(std::mem::take(&mut *state), msg);
        *state = next;
        effects
    }

    async fn run_effect(&self, effect: Effect) -> Option<Msg> {
        match effect {
            Effect::Classify { tab, generation } => {
                let category = self.classifier.classify(&tab).await;
                Some(Msg::TabClassified {
                    tab,
                    generation,
                    category,
                })
            }
            Effect::ClassifyBatch { tabs } => {
                let (tabs, generations): (Vec<Tab>, Vec<_>) = tabs.into_iter().unzip();
                let categories = self.batch.classify_all(&tabs).await;
                Some(Msg::BatchClassified(
                    tabs.iter()
                        .zip(generations)
                        .zip(categories)
                        .map(|((tab, generation), category)| (tab.id, generation, category))
                        .collect(),
                ))
            }
            Effect::PersistIndex => {
                // Held across the save so snapshots reach the store in order.
                let state = self.lock();
                self.store.save_tab_categories(state.index().snapshot());
                None
            }
            Effect::JoinMatchingGroup {
                tab_id,
                window_id,
                category,
            } => {
                if let Err(err) = self
                    .reconciler
                    .join_matching_group(tab_id, window_id, &category)
                    .await
                {
                    organizer_debug!("Tab {} not joined to {}: {}", tab_id, category, err);
                }
                None
            }
            Effect::NotifyRefresh => {
                self.store.mark_needs_refresh();
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, OrganizerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
