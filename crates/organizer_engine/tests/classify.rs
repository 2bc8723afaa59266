use std::sync::Arc;
use std::time::Duration;

use organizer_core::{Category, Tab};
use organizer_engine::{
    CategoryCache, ClassificationRequest, ClassificationService, Classifier, FailureKind,
    HttpClassificationService, RetryPolicy, ServiceSettings, StateStore,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tab(id: u64, url: &str, title: &str) -> Tab {
    Tab {
        id,
        window_id: 1,
        url: url.to_string(),
        title: title.to_string(),
        group_id: None,
    }
}

fn settings_for(server: &MockServer) -> ServiceSettings {
    ServiceSettings {
        endpoint: format!("{}/v1/generate", server.uri()),
        api_key: "test-key".to_string(),
        ..ServiceSettings::default()
    }
}

fn classifier_for(server: &MockServer) -> (Classifier, CategoryCache) {
    let cache = CategoryCache::new(Arc::new(StateStore::in_memory()));
    let service = HttpClassificationService::new(settings_for(server)).unwrap();
    let retry = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(10),
    };
    (
        Classifier::new(Arc::new(service), cache.clone(), retry),
        cache,
    )
}

fn generations(texts: &[&str]) -> serde_json::Value {
    json!({
        "id": "gen-1",
        "generations": texts.iter().map(|text| json!({ "text": text })).collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn cached_url_is_returned_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generations(&["News"])))
        .expect(0)
        .mount(&server)
        .await;

    let (classifier, cache) = classifier_for(&server);
    cache.put("https://example.com/a", Category::new("Work").unwrap());

    let category = classifier
        .classify(&tab(7, "https://example.com/a", "Quarterly report"))
        .await;
    assert_eq!(category.as_str(), "Work");
}

#[tokio::test]
async fn first_line_of_generation_becomes_category_and_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "max_tokens": 10,
            "temperature": 0.2,
            "stop_sequences": ["\n"],
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(generations(&["  Technology \nand more text", "Ignored"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (classifier, cache) = classifier_for(&server);
    let rust_docs = tab(1, "https://doc.rust-lang.org/", "The Rust Programming Language");

    assert_eq!(classifier.classify(&rust_docs).await.as_str(), "Technology");
    assert_eq!(
        cache.get("https://doc.rust-lang.org/"),
        Some(Category::new("Technology").unwrap())
    );

    // Same URL in a different tab is served from the cache.
    let reopened = tab(2, "https://doc.rust-lang.org/", "Rust docs");
    assert_eq!(classifier.classify(&reopened).await.as_str(), "Technology");
}

#[tokio::test]
async fn persistent_server_errors_degrade_to_other() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (classifier, cache) = classifier_for(&server);
    let category = classifier
        .classify(&tab(3, "https://flaky.example/", "Flaky"))
        .await;

    assert_eq!(category, Category::other());
    assert!(cache.get("https://flaky.example/").is_none());
}

#[tokio::test]
async fn empty_and_malformed_replies_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generations(&[])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generations(&["Shopping"])))
        .expect(1)
        .mount(&server)
        .await;

    let (classifier, _cache) = classifier_for(&server);
    let category = classifier
        .classify(&tab(4, "https://shop.example/", "Cart"))
        .await;
    assert_eq!(category.as_str(), "Shopping");
}

#[tokio::test]
async fn blank_generation_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generations(&["   \n"])))
        .expect(2)
        .mount(&server)
        .await;

    let cache = CategoryCache::new(Arc::new(StateStore::in_memory()));
    let service = HttpClassificationService::new(settings_for(&server)).unwrap();
    let classifier = Classifier::new(
        Arc::new(service),
        cache.clone(),
        RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        },
    );

    let category = classifier
        .classify(&tab(5, "https://blank.example/", "Blank"))
        .await;
    assert_eq!(category, Category::other());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn service_reports_status_and_empty_generations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(settings_for(&server)).unwrap();
    let request = ClassificationRequest::for_tab(&tab(6, "https://x.example/", "X"));
    let err = service.generate(&request).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(503));

    let empty = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "generations": [] })))
        .mount(&empty)
        .await;
    let service = HttpClassificationService::new(settings_for(&empty)).unwrap();
    let err = service.generate(&request).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::EmptyGeneration);
}

#[test]
fn prompt_carries_url_title_and_optional_content() {
    let mut request = ClassificationRequest::for_tab(&tab(1, "https://news.example/", "Headlines"));
    let prompt = request.prompt();
    assert!(prompt.contains("URL: https://news.example/"));
    assert!(prompt.contains("Title: Headlines"));
    assert!(!prompt.contains("Content:"));

    request.content = Some("x".repeat(2_000));
    let prompt = request.prompt();
    let content_line = prompt
        .lines()
        .find(|line| line.starts_with("Content: "))
        .unwrap();
    assert_eq!(content_line.len(), "Content: ".len() + 500);
}
