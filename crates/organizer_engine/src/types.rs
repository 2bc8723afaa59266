use std::fmt;

use organizer_core::{GroupId, TabId, WindowId, WindowKind};

/// A single failed classification attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifyError {
    pub kind: FailureKind,
    pub message: String,
}

impl ClassifyError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Every kind is retried; malformed replies count as transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidRequest,
    HttpStatus(u16),
    Timeout,
    Network,
    MalformedResponse,
    EmptyGeneration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidRequest => write!(f, "invalid request"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::EmptyGeneration => write!(f, "no usable generation"),
        }
    }
}

/// Failure reported by the tab host for a single call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("no tab with id {0}")]
    TabNotFound(TabId),
    #[error("no window with id {0}")]
    WindowNotFound(WindowId),
    #[error("no group with id {0}")]
    GroupNotFound(GroupId),
    #[error("no window is open")]
    NoWindows,
    #[error("{0}")]
    Rejected(String),
}

/// Why a reconciler operation could not run at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Tab organization is only supported in normal windows (window {window_id} is a {kind} window).")]
    NotNormalWindow { window_id: WindowId, kind: WindowKind },
    #[error("Window {0} no longer exists.")]
    WindowNotFound(WindowId),
    #[error("No categories were selected.")]
    NoCategories,
    #[error("There is only one window. Nothing to combine.")]
    NothingToCombine,
    #[error("No normal window is open.")]
    NoNormalWindow,
    #[error("Browser rejected the operation: {0}")]
    Host(#[from] HostError),
}
