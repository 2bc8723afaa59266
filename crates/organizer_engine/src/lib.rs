//! Organizer engine: persistence, classification, host reconciliation and
//! the request protocol.
mod batch;
mod cache;
mod classify;
mod engine;
mod host;
mod memory_host;
mod organizer;
mod protocol;
mod reconcile;
mod service;
mod store;
mod types;

pub use batch::{BatchClassifier, BatchSettings};
pub use cache::{spawn_cache_cleaner, CacheSettings, CategoryCache};
pub use classify::{Classifier, RetryPolicy};
pub use engine::EngineHandle;
pub use host::{GroupUpdate, TabHost, TabQuery};
pub use memory_host::InMemoryHost;
pub use organizer::{Organizer, OrganizerSettings};
pub use protocol::{
    parse_request, OrganizeOption, OrganizeOutcome, Outcome, Request, Response, ToggleOutcome,
};
pub use reconcile::{CombineReport, GroupReconciler, SeparateReport, ToggleReport};
pub use service::{
    ClassificationRequest, ClassificationService, HttpClassificationService, ServiceSettings,
};
pub use store::{JsonFileBackend, MemoryBackend, PersistedState, StateStore, StoreBackend, StoreError};
pub use types::{ClassifyError, FailureKind, HostError, ReconcileError};
