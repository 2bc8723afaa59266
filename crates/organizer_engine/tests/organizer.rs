use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use organizer_core::{Category, Group, GroupId, Tab, TabId, Window, WindowId, WindowKind};
use organizer_engine::{
    BatchSettings, CacheSettings, ClassificationRequest, ClassificationService, ClassifyError,
    EngineHandle, FailureKind, GroupUpdate, HostError, InMemoryHost, Organizer,
    OrganizerSettings, Request, Response, RetryPolicy, StateStore, TabHost, TabQuery,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

static INIT: Once = Once::new();

/// Answers from a fixed URL table and fails for anything else.
struct Lookup {
    answers: BTreeMap<String, String>,
    calls: AtomicUsize,
}

impl Lookup {
    fn new(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(url, label)| (url.to_string(), label.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ClassificationService for Lookup {
    async fn generate(&self, request: &ClassificationRequest) -> Result<String, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(&request.url).cloned().ok_or_else(|| ClassifyError {
            kind: FailureKind::HttpStatus(500),
            message: "unknown page".to_string(),
        })
    }
}

struct Fixture {
    host: Arc<InMemoryHost>,
    store: Arc<StateStore>,
    service: Arc<Lookup>,
    organizer: Organizer,
}

fn fixture(answers: &[(&str, &str)]) -> Fixture {
    INIT.call_once(organizer_logging::initialize_for_tests);
    let host = Arc::new(InMemoryHost::new());
    let store = Arc::new(StateStore::in_memory());
    let service = Arc::new(Lookup::new(answers));
    let settings = OrganizerSettings {
        retry: RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        },
        batch: BatchSettings { chunk_size: 2 },
    };
    let organizer = Organizer::new(host.clone(), service.clone(), store.clone(), settings);
    Fixture {
        host,
        store,
        service,
        organizer,
    }
}

fn json_of(response: &Response) -> Value {
    serde_json::from_str(&response.to_json()).unwrap()
}

fn category(label: &str) -> Category {
    Category::new(label).unwrap()
}

#[tokio::test]
async fn unknown_and_malformed_requests_are_reported() {
    let f = fixture(&[]);

    let response = f.organizer.handle_json(r#"{"action":"launchRockets"}"#).await;
    assert_eq!(json_of(&response), json!({ "error": "Unknown action" }));

    let response = f.organizer.handle_json(r#"{"windowId":1}"#).await;
    assert_eq!(json_of(&response), json!({ "error": "Unknown action" }));

    let response = f
        .organizer
        .handle_json(r#"{"action":"organizeTabs","windowId":1,"option":"juggle"}"#)
        .await;
    let error = json_of(&response)["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Malformed organizeTabs request"), "{error}");
}

#[tokio::test]
async fn loaded_tabs_are_classified_indexed_and_joined_to_their_group() {
    let f = fixture(&[("https://mail.example/inbox", "Work\n")]);
    let w = f.host.add_window(WindowKind::Normal);
    let existing = f.host.add_tab(w, "https://docs.example/", "Docs").unwrap();
    let group = f.host.add_group(w, "Work", &[existing]).unwrap();
    let fresh = f
        .host
        .add_tab(w, "https://mail.example/inbox", "Inbox")
        .unwrap();

    f.organizer
        .on_tab_loaded(f.host.tab(fresh).unwrap())
        .await;

    assert_eq!(f.organizer.index().get(fresh), category("Work"));
    assert_eq!(f.store.tab_categories().get(&fresh), Some(&category("Work")));
    assert_eq!(f.host.tab(fresh).unwrap().group_id, Some(group));
    assert!(f.organizer.take_refresh_flag());
    assert!(!f.organizer.take_refresh_flag());
}

#[tokio::test]
async fn internal_pages_and_popups_are_not_classified() {
    let f = fixture(&[("https://mail.example/", "Work")]);
    let w = f.host.add_window(WindowKind::Normal);
    let popup = f.host.add_window(WindowKind::Popup);
    let settings = f.host.add_tab(w, "chrome://settings/", "Settings").unwrap();
    let in_popup = f.host.add_tab(popup, "https://mail.example/", "Mail").unwrap();

    f.organizer.on_tab_loaded(f.host.tab(settings).unwrap()).await;
    f.organizer.on_tab_loaded(f.host.tab(in_popup).unwrap()).await;

    assert_eq!(f.service.calls.load(Ordering::SeqCst), 0);
    assert!(f.organizer.index().is_empty());
}

#[tokio::test]
async fn closed_tabs_leave_the_index() {
    let f = fixture(&[("https://mail.example/", "Work")]);
    let w = f.host.add_window(WindowKind::Normal);
    let tab = f.host.add_tab(w, "https://mail.example/", "Mail").unwrap();
    f.organizer.on_tab_loaded(f.host.tab(tab).unwrap()).await;
    assert!(f.organizer.index().contains(tab));

    f.host.close_tab(tab).unwrap();
    f.organizer.on_tab_removed(tab).await;

    assert!(!f.organizer.index().contains(tab));
    assert!(f.store.tab_categories().is_empty());
}

#[tokio::test]
async fn initial_scan_classifies_every_normal_tab() {
    let f = fixture(&[
        ("https://mail.example/", "Work"),
        ("https://news.example/", "News"),
        ("https://shop.example/", "Shopping"),
    ]);
    let w = f.host.add_window(WindowKind::Normal);
    let other = f.host.add_window(WindowKind::Normal);
    let a = f.host.add_tab(w, "https://mail.example/", "Mail").unwrap();
    let b = f.host.add_tab(w, "https://news.example/", "News").unwrap();
    let c = f.host.add_tab(other, "https://shop.example/", "Shop").unwrap();
    let d = f.host.add_tab(other, "https://unknown.example/", "?").unwrap();
    let blank = f.host.add_tab(other, "about:blank", "").unwrap();

    f.organizer.categorize_all().await;

    let index = f.organizer.index();
    assert_eq!(index.get(a), category("Work"));
    assert_eq!(index.get(b), category("News"));
    assert_eq!(index.get(c), category("Shopping"));
    assert_eq!(index.get(d), Category::other());
    assert!(!index.contains(blank));
    assert_eq!(f.store.tab_categories().len(), 4);
}

#[tokio::test]
async fn startup_scan_drops_saved_entries_for_tabs_that_are_not_open() {
    INIT.call_once(organizer_logging::initialize_for_tests);
    let host = Arc::new(InMemoryHost::new());
    let w = host.add_window(WindowKind::Normal);
    let newtab = host.add_tab(w, "chrome://newtab/", "New Tab").unwrap();
    let store = Arc::new(StateStore::in_memory());
    store.save_tab_categories(
        [(newtab, category("Shopping")), (newtab + 100, category("News"))]
            .into_iter()
            .collect(),
    );
    let organizer = Organizer::new(
        host.clone(),
        Arc::new(Lookup::new(&[])),
        store.clone(),
        OrganizerSettings::default(),
    );
    assert_eq!(organizer.index().len(), 2);

    organizer.categorize_all().await;

    assert_eq!(organizer.index().get(newtab), Category::uncategorized());
    assert!(organizer.index().is_empty());
    assert!(store.tab_categories().is_empty());
}

#[tokio::test]
async fn organize_request_groups_and_reports_the_overview() {
    let f = fixture(&[]);
    let w = f.host.add_window(WindowKind::Normal);
    let a = f.host.add_tab(w, "https://mail.example/", "Mail").unwrap();
    let b = f.host.add_tab(w, "https://docs.example/", "Docs").unwrap();
    f.store.save_tab_categories(BTreeMap::from([
        (a, category("Work")),
        (b, category("Work")),
    ]));
    // Reload so the organizer picks up the persisted index.
    let organizer = Organizer::new(
        f.host.clone(),
        f.service.clone(),
        f.store.clone(),
        OrganizerSettings::default(),
    );

    let raw = json!({
        "action": "organizeTabs",
        "windowId": w,
        "option": "groupTabs",
        "categories": ["Work"],
    })
    .to_string();
    let response = json_of(&organizer.handle_json(&raw).await);

    assert_eq!(response["success"], json!(true));
    assert_eq!(response["message"], json!("2 tabs were grouped."));
    assert_eq!(response["categories"], json!({ "Work": 2 }));
    assert_eq!(response["windowCount"], json!(1));
    let group_id = f.host.groups()[0].id;
    assert_eq!(response["groupedTabs"], json!({ "Work": [group_id] }));
    assert!(organizer.take_refresh_flag());
}

#[tokio::test]
async fn organize_on_a_popup_fails_with_a_message() {
    let f = fixture(&[]);
    let popup = f.host.add_window(WindowKind::Popup);
    let response = f
        .organizer
        .handle(Request::OrganizeTabs {
            window_id: popup,
            option: organizer_engine::OrganizeOption::UngroupAllTabs,
            categories: Vec::new(),
        })
        .await;

    let value = json_of(&response);
    assert_eq!(value["success"], json!(false));
    assert!(value["message"]
        .as_str()
        .unwrap()
        .contains("only supported in normal windows"));
    assert!(value.get("categories").is_none());
    assert!(!f.organizer.take_refresh_flag());
}

#[tokio::test]
async fn combining_a_single_window_reports_failure() {
    let f = fixture(&[]);
    let w = f.host.add_window(WindowKind::Normal);
    f.host.add_tab(w, "https://a.example/", "A").unwrap();

    let response = f
        .organizer
        .handle_json(r#"{"action":"combineAllWindows","removeDuplicates":true}"#)
        .await;
    assert_eq!(
        json_of(&response),
        json!({
            "success": false,
            "message": "There is only one window. Nothing to combine."
        })
    );
}

#[tokio::test]
async fn combining_windows_reports_moves_and_removed_duplicates() {
    let f = fixture(&[]);
    let target = f.host.add_window(WindowKind::Normal);
    let source = f.host.add_window(WindowKind::Normal);
    f.host.add_tab(target, "https://x.example/", "X").unwrap();
    f.host.add_tab(source, "https://x.example/", "X").unwrap();
    f.host.add_tab(source, "https://y.example/", "Y").unwrap();

    let response = f
        .organizer
        .handle(Request::CombineAllWindows {
            remove_duplicates: true,
        })
        .await;
    assert_eq!(
        json_of(&response),
        json!({
            "success": true,
            "message": "All windows combined successfully. 1 tab(s) moved. 1 duplicate tab(s) removed."
        })
    );
}

#[tokio::test]
async fn toggle_and_listing_requests() {
    let f = fixture(&[]);
    let w = f.host.add_window(WindowKind::Normal);
    let a = f.host.add_tab(w, "https://a.example/", "A").unwrap();
    let group = f.host.add_group(w, "Uncategorized", &[a]).unwrap();

    let response = json_of(
        &f.organizer
            .handle_json(&json!({ "action": "toggleGroupCollapse", "groupId": group }).to_string())
            .await,
    );
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["message"], json!("Group collapsed successfully"));
    assert_eq!(response["group"]["collapsed"], json!(true));
    assert_eq!(response["evicted"], json!([]));

    let response = json_of(
        &f.organizer
            .handle_json(&json!({ "action": "getGroupedTabs", "windowId": w }).to_string())
            .await,
    );
    assert_eq!(response, json!({ "Uncategorized": 1 }));

    let response = json_of(
        &f.organizer
            .handle_json(r#"{"action":"getTabCategories"}"#)
            .await,
    );
    assert_eq!(response, json!({}));
}

#[test]
fn engine_answers_requests_from_its_own_thread() {
    let f = fixture(&[("https://mail.example/", "Work")]);
    let w = f.host.add_window(WindowKind::Normal);
    let tab = f.host.add_tab(w, "https://mail.example/", "Mail").unwrap();
    let organizer = Arc::new(f.organizer);
    let engine = EngineHandle::start(organizer.clone(), CacheSettings::default()).unwrap();

    engine.scan();
    let mut indexed = false;
    for _ in 0..200 {
        if organizer.index().contains(tab) {
            indexed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(indexed);

    let reply = engine.request(Request::GetTabCategories);
    let response = reply.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        json_of(&response),
        json!({ tab.to_string(): "Work" })
    );

    // A requester that went away does not take the engine down.
    drop(engine.request(Request::TakeRefreshFlag));
    let reply = engine.request(Request::TakeRefreshFlag);
    match reply.recv_timeout(Duration::from_secs(5)).unwrap() {
        Response::Refresh { .. } => {}
        other => panic!("unexpected response {other:?}"),
    }
}

/// Delegates to an in-memory host but answers window lookups late.
struct SlowWindows {
    inner: Arc<InMemoryHost>,
    delay: Duration,
}

#[async_trait::async_trait]
impl TabHost for SlowWindows {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<Tab>, HostError> {
        self.inner.query_tabs(query).await
    }
    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        self.inner.remove_tabs(tab_ids).await
    }
    async fn move_tabs(&self, tab_ids: &[TabId], window_id: WindowId) -> Result<(), HostError> {
        self.inner.move_tabs(tab_ids, window_id).await
    }
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: GroupId) -> Result<(), HostError> {
        self.inner.group_tabs(tab_ids, group_id).await
    }
    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        self.inner.ungroup_tabs(tab_ids).await
    }
    async fn create_group(
        &self,
        window_id: WindowId,
        tab_ids: &[TabId],
    ) -> Result<GroupId, HostError> {
        self.inner.create_group(window_id, tab_ids).await
    }
    async fn update_group(
        &self,
        group_id: GroupId,
        update: &GroupUpdate,
    ) -> Result<Group, HostError> {
        self.inner.update_group(group_id, update).await
    }
    async fn get_group(&self, group_id: GroupId) -> Result<Group, HostError> {
        self.inner.get_group(group_id).await
    }
    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<Group>, HostError> {
        self.inner.query_groups(window_id).await
    }
    async fn get_window(&self, window_id: WindowId) -> Result<Window, HostError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_window(window_id).await
    }
    async fn current_window(&self) -> Result<Window, HostError> {
        self.inner.current_window().await
    }
    async fn list_windows(&self) -> Result<Vec<Window>, HostError> {
        self.inner.list_windows().await
    }
    async fn create_window(&self) -> Result<Window, HostError> {
        self.inner.create_window().await
    }
    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        self.inner.focus_window(window_id).await
    }
    async fn remove_window(&self, window_id: WindowId) -> Result<(), HostError> {
        self.inner.remove_window(window_id).await
    }
}

#[test]
fn engine_applies_tab_events_in_the_order_they_arrive() {
    INIT.call_once(organizer_logging::initialize_for_tests);
    let inner = Arc::new(InMemoryHost::new());
    let w = inner.add_window(WindowKind::Normal);
    let closed = inner.add_tab(w, "https://mail.example/", "Mail").unwrap();
    let kept = inner.add_tab(w, "https://news.example/", "News").unwrap();
    let host = Arc::new(SlowWindows {
        inner: inner.clone(),
        delay: Duration::from_millis(50),
    });
    let store = Arc::new(StateStore::in_memory());
    let service = Arc::new(Lookup::new(&[
        ("https://mail.example/", "Work"),
        ("https://news.example/", "News"),
    ]));
    let organizer = Arc::new(Organizer::new(
        host,
        service,
        store.clone(),
        OrganizerSettings::default(),
    ));
    let engine = EngineHandle::start(organizer.clone(), CacheSettings::default()).unwrap();

    // The removal arrives while the load is still looking up its window.
    engine.notify_tab_loaded(inner.tab(closed).unwrap());
    engine.notify_tab_removed(closed);
    engine.notify_tab_loaded(inner.tab(kept).unwrap());

    let mut indexed = false;
    for _ in 0..300 {
        if organizer.index().contains(kept) {
            indexed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(indexed);
    // Give the first tab's classification time to come back, too.
    std::thread::sleep(Duration::from_millis(100));

    assert!(!organizer.index().contains(closed));
    assert!(!store.tab_categories().contains_key(&closed));
    assert_eq!(organizer.index().get(kept), category("News"));
}
