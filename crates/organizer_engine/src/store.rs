//! Durable key-value state shared by the cache, the tab index and the UI
//! refresh flag.
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use organizer_core::{Category, TabId};
use organizer_logging::{organizer_error, organizer_info, organizer_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    /// URL to category, cleared wholesale on a timer.
    pub category_cache: BTreeMap<String, Category>,
    pub tab_categories: BTreeMap<TabId, Category>,
    pub needs_refresh: bool,
    pub cache_cleared_utc: Option<DateTime<Utc>>,
}

pub trait StoreBackend: Send + Sync {
    fn load(&self) -> Result<PersistedState, StoreError>;
    fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// Keeps state as one JSON document, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<PersistedState, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PersistedState::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;
        write_atomically(&self.path, content.as_bytes())?;
        Ok(())
    }
}

fn write_atomically(target: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Process-local backend; what was saved last is what the next load sees.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<PersistedState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            saved: Mutex::new(Some(state)),
        }
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<PersistedState, StoreError> {
        let saved = self.saved.lock().unwrap_or_else(|p| p.into_inner());
        Ok(saved.clone().unwrap_or_default())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let mut saved = self.saved.lock().unwrap_or_else(|p| p.into_inner());
        *saved = Some(state.clone());
        Ok(())
    }
}

/// In-memory copy of [`PersistedState`] written through to a backend.
///
/// The in-memory copy stays authoritative when a save fails; the failure is
/// logged and the next successful save catches the backend up.
pub struct StateStore {
    state: Mutex<PersistedState>,
    backend: Box<dyn StoreBackend>,
}

impl StateStore {
    pub fn open(backend: impl StoreBackend + 'static) -> Self {
        let state = match backend.load() {
            Ok(state) => {
                organizer_info!(
                    "Loaded persisted state: {} cached urls, {} indexed tabs",
                    state.category_cache.len(),
                    state.tab_categories.len()
                );
                state
            }
            Err(err) => {
                organizer_warn!("Failed to load persisted state, starting empty: {}", err);
                PersistedState::default()
            }
        };
        Self {
            state: Mutex::new(state),
            backend: Box::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::new())
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        f(&*self.lock())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut *state);
        if let Err(err) = self.backend.save(&state) {
            organizer_error!("Failed to persist state: {}", err);
        }
        result
    }

    pub fn snapshot(&self) -> PersistedState {
        self.read(|state| state.clone())
    }

    pub fn cached_category(&self, url: &str) -> Option<Category> {
        self.read(|state| state.category_cache.get(url).cloned())
    }

    pub fn cache_category(&self, url: &str, category: Category) {
        self.mutate(|state| {
            state.category_cache.insert(url.to_string(), category);
        });
    }

    pub fn cached_url_count(&self) -> usize {
        self.read(|state| state.category_cache.len())
    }

    /// Drops every cached URL and records when it happened.
    pub fn clear_cache(&self, now: DateTime<Utc>) {
        self.mutate(|state| {
            state.category_cache.clear();
            state.cache_cleared_utc = Some(now);
        });
    }

    pub fn cache_cleared_at(&self) -> Option<DateTime<Utc>> {
        self.read(|state| state.cache_cleared_utc)
    }

    /// Starts the staleness clock without dropping entries, if it never ran.
    pub fn start_cache_clock(&self, now: DateTime<Utc>) {
        if self.cache_cleared_at().is_none() {
            self.mutate(|state| {
                state.cache_cleared_utc.get_or_insert(now);
            });
        }
    }

    pub fn tab_categories(&self) -> BTreeMap<TabId, Category> {
        self.read(|state| state.tab_categories.clone())
    }

    pub fn save_tab_categories(&self, entries: BTreeMap<TabId, Category>) {
        self.mutate(|state| state.tab_categories = entries);
    }

    pub fn mark_needs_refresh(&self) {
        self.mutate(|state| state.needs_refresh = true);
    }

    /// Reads and clears the refresh flag in one step.
    pub fn take_needs_refresh(&self) -> bool {
        if !self.read(|state| state.needs_refresh) {
            return false;
        }
        self.mutate(|state| std::mem::replace(&mut state.needs_refresh, false))
    }
}
