//! One JSON line in, at most one JSON line out.
use std::sync::Arc;
use std::time::Duration;

use organizer_core::{Tab, TabId};
use organizer_engine::{parse_request, EngineHandle, InMemoryHost, Response};
use organizer_logging::{organizer_debug, organizer_warn};
use serde::Deserialize;
use serde_json::Value;

/// Browser notifications, told apart from requests by their `event` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum HostEvent {
    TabUpdated { tab: Tab },
    TabRemoved { tab_id: TabId },
}

pub struct Session {
    host: Arc<InMemoryHost>,
    engine: EngineHandle,
    reply_timeout: Duration,
}

impl Session {
    pub fn new(host: Arc<InMemoryHost>, engine: EngineHandle, reply_timeout: Duration) -> Self {
        Self {
            host,
            engine,
            reply_timeout,
        }
    }

    /// Handles one input line. Events produce no output; every request
    /// produces exactly one response line.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => return Some(Response::error(format!("Malformed request: {err}")).to_json()),
        };

        if value.get("event").is_some() {
            match serde_json::from_value::<HostEvent>(value) {
                Ok(event) => self.apply_event(event),
                Err(err) => organizer_warn!("Ignoring malformed event {}: {}", line, err),
            }
            return None;
        }

        let request = match parse_request(line) {
            Ok(request) => request,
            Err(response) => return Some(response.to_json()),
        };
        let reply = self.engine.request(request);
        let response = reply
            .recv_timeout(self.reply_timeout)
            .unwrap_or_else(|err| Response::error(format!("No response from engine: {err}")));
        Some(response.to_json())
    }

    fn apply_event(&self, event: HostEvent) {
        match event {
            HostEvent::TabUpdated { tab } => {
                let tab_id = tab.id;
                if let Err(err) = self.host.upsert_tab(tab) {
                    organizer_warn!("Dropping update for tab {}: {}", tab_id, err);
                    return;
                }
                if let Some(tab) = self.host.tab(tab_id) {
                    self.engine.notify_tab_loaded(tab);
                }
            }
            HostEvent::TabRemoved { tab_id } => {
                if let Err(err) = self.host.close_tab(tab_id) {
                    organizer_debug!("Tab {} was already gone: {}", tab_id, err);
                }
                self.engine.notify_tab_removed(tab_id);
            }
        }
    }
}
