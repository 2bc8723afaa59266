//! Application settings, read from a RON file.
//!
//! Every field has a default, so a missing file or a partial one both work.
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use organizer_engine::{
    BatchSettings, CacheSettings, OrganizerSettings, RetryPolicy, ServiceSettings,
};
use organizer_logging::{organizer_info, organizer_warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_FILE: &str = "organizer.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// JSON document holding the cache, the tab index and the refresh flag.
    pub state_path: PathBuf,
    /// Windows and tabs to start from; one empty window when unset.
    pub snapshot_path: Option<PathBuf>,
    pub log_path: PathBuf,
    pub log_level: String,
    pub log_to_terminal: bool,
    /// Name of the environment variable holding the service API key.
    pub api_key_env: String,
    pub endpoint: String,
    pub model: String,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub chunk_size: usize,
    pub cache_clear_hours: u64,
    pub reply_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        let service = ServiceSettings::default();
        let retry = RetryPolicy::default();
        Self {
            state_path: PathBuf::from("organizer_state.json"),
            snapshot_path: None,
            log_path: PathBuf::from("organizer.log"),
            log_level: "info".to_string(),
            log_to_terminal: false,
            api_key_env: "COHERE_API_KEY".to_string(),
            endpoint: service.endpoint,
            model: service.model,
            request_timeout_secs: None,
            max_attempts: retry.max_attempts,
            retry_delay_ms: retry.delay.as_millis() as u64,
            chunk_size: BatchSettings::default().chunk_size,
            cache_clear_hours: 24,
            reply_timeout_secs: 60,
        }
    }
}

impl AppSettings {
    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(err) => {
                organizer_warn!("Failed to read settings from {:?}: {}", path, err);
                return Self::default();
            }
        };

        match ron::from_str(&content) {
            Ok(settings) => {
                organizer_info!("Loaded settings from {:?}", path);
                settings
            }
            Err(err) => {
                organizer_warn!("Failed to parse settings from {:?}: {}", path, err);
                Self::default()
            }
        }
    }

    pub fn level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    pub fn service_settings(&self, api_key: String) -> ServiceSettings {
        ServiceSettings {
            endpoint: self.endpoint.clone(),
            api_key,
            model: self.model.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            ..ServiceSettings::default()
        }
    }

    pub fn organizer_settings(&self) -> OrganizerSettings {
        OrganizerSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            batch: BatchSettings {
                chunk_size: self.chunk_size,
            },
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            clear_interval: Duration::from_secs(self.cache_clear_hours * 60 * 60),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}
