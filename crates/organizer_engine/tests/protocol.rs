use organizer_core::Category;
use organizer_engine::{parse_request, OrganizeOption, Request, Response};
use pretty_assertions::assert_eq;

#[test]
fn requests_decode_by_action_name() {
    assert_eq!(
        parse_request(
            r#"{"action":"organizeTabs","windowId":4,"option":"separateWindows","categories":["Work","News"]}"#
        )
        .unwrap(),
        Request::OrganizeTabs {
            window_id: 4,
            option: OrganizeOption::SeparateWindows,
            categories: vec![Category::new("Work").unwrap(), Category::new("News").unwrap()],
        }
    );
    assert_eq!(
        parse_request(r#"{"action":"toggleGroupCollapse","groupId":9}"#).unwrap(),
        Request::ToggleGroupCollapse {
            group_id: 9,
            collapsed: None,
        }
    );
    assert_eq!(
        parse_request(r#"{"action":"combineTabs"}"#).unwrap(),
        Request::CombineTabs {
            categories: Vec::new()
        }
    );
    assert_eq!(
        parse_request(r#"{"action":"getTabCategories"}"#).unwrap(),
        Request::GetTabCategories
    );
}

#[test]
fn blank_category_labels_are_rejected() {
    let err = parse_request(r#"{"action":"combineTabs","categories":["  "]}"#).unwrap_err();
    match err {
        Response::Error { error } => assert!(error.starts_with("Malformed combineTabs request")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn garbage_is_not_an_action() {
    let err = parse_request("[1, 2").unwrap_err();
    assert!(matches!(err, Response::Error { .. }));
    assert_eq!(
        parse_request(r#"{"action":42}"#).unwrap_err(),
        Response::error("Unknown action")
    );
}
