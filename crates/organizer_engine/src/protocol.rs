//! JSON request/response shapes exchanged with the popup.
use std::collections::BTreeMap;

use organizer_core::{Category, CategoryOverview, Group, GroupId, TabId, WindowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const KNOWN_ACTIONS: &[&str] = &[
    "getCategoryList",
    "organizeTabs",
    "combineAllWindows",
    "combineTabs",
    "getGroupedTabs",
    "getTabCategories",
    "toggleGroupCollapse",
    "removeDuplicates",
    "takeRefreshFlag",
];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetCategoryList {
        window_id: WindowId,
    },
    OrganizeTabs {
        window_id: WindowId,
        option: OrganizeOption,
        #[serde(default)]
        categories: Vec<Category>,
    },
    CombineAllWindows {
        #[serde(default)]
        remove_duplicates: bool,
    },
    CombineTabs {
        #[serde(default)]
        categories: Vec<Category>,
    },
    GetGroupedTabs {
        window_id: WindowId,
    },
    GetTabCategories,
    /// Without `collapsed`, the group's current state is flipped.
    ToggleGroupCollapse {
        group_id: GroupId,
        #[serde(default)]
        collapsed: Option<bool>,
    },
    RemoveDuplicates {
        window_id: WindowId,
    },
    TakeRefreshFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrganizeOption {
    GroupTabs,
    UngroupTabs,
    SeparateWindows,
    UngroupAllTabs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizeOutcome {
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Refreshed view of the window, absent when the operation failed.
    #[serde(flatten)]
    pub overview: Option<CategoryOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    /// Tabs removed from the group because their category moved on.
    pub evicted: Vec<TabId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Overview(CategoryOverview),
    Organize(OrganizeOutcome),
    Toggle(ToggleOutcome),
    Outcome(Outcome),
    GroupedTabs(BTreeMap<String, usize>),
    TabCategories(BTreeMap<TabId, Category>),
    Refresh {
        #[serde(rename = "needsRefresh")]
        needs_refresh: bool,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|err| format!(r#"{{"error":"unserializable response: {err}"}}"#))
    }
}

/// Decodes one raw request. An action outside the protocol yields the
/// `Unknown action` error; a known action with bad fields reports what was wrong.
pub fn parse_request(raw: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| Response::error(format!("Malformed request: {err}")))?;
    let action = value.get("action").and_then(Value::as_str);
    match action {
        Some(action) if KNOWN_ACTIONS.contains(&action) => {
            let action = action.to_string();
            serde_json::from_value(value)
                .map_err(|err| Response::error(format!("Malformed {action} request: {err}")))
        }
        _ => Err(Response::error("Unknown action")),
    }
}
