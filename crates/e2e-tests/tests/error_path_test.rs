//! Error path E2E tests.
//!
//! Every rejected request answers `{"error": "..."}` with a status that
//! tells validation failures (400) apart from capability or store
//! failures (500). No test should cause a panic.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use disaster_embeddings::{HashEmbedder, MockEmbedder};
use disaster_ingest::{MockClassifier, StaticImagerySource};
use disaster_service::AppState;
use disaster_storage::{EventStore, RocksEventStore, StorageError, StoreConfig};
use e2e_tests::{flooded_scene, TestHarness, TestServer, UnavailableStore};

async fn send(request: reqwest::RequestBuilder) -> (u16, Value) {
    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

fn error_message(body: &Value) -> &str {
    body["error"]
        .as_str()
        .unwrap_or_else(|| panic!("Expected error body, got: {}", body))
}

#[tokio::test]
async fn test_detect_requires_image_or_region() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({"image_url": "  "}), json!({"type": "flood"})] {
        let (status, error) = send(client.post(server.url("/detect")).json(&body)).await;
        assert_eq!(status, 400, "body {} should be rejected", body);
        assert!(!error_message(&error).is_empty());
    }
    assert_eq!(harness.store.stats().unwrap().event_count, 0);
}

#[tokio::test]
async fn test_detect_rejects_bad_region() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;
    let client = reqwest::Client::new();

    let (status, error) = send(
        client
            .post(server.url("/detect"))
            .json(&json!({"region": {"bbox": "5,5,1,1"}})),
    )
    .await;
    assert_eq!(status, 400);
    assert!(!error_message(&error).is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;
    let client = reqwest::Client::new();

    for path in ["/detect", "/get_similar_disasters"] {
        let (status, error) = send(
            client
                .post(server.url(path))
                .header("content-type", "application/json")
                .body("{not json"),
        )
        .await;
        assert_eq!(status, 400, "{} should reject malformed JSON", path);
        assert!(!error_message(&error).is_empty());
    }
}

#[tokio::test]
async fn test_similar_requires_description() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;
    let client = reqwest::Client::new();

    let (status, error) = send(
        client
            .post(server.url("/get_similar_disasters"))
            .json(&json!({})),
    )
    .await;
    assert_eq!(status, 400);
    assert!(error_message(&error).contains("description"));
}

#[tokio::test]
async fn test_list_rejects_bad_query() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;

    for query in [
        "bbox=1,2,3",
        "bbox=200,0,201,1",
        "days=soon",
        "days=4294967295",
        "type=",
    ] {
        let (status, error) = send(
            reqwest::Client::new().get(server.url(&format!("/api/disasters?{}", query))),
        )
        .await;
        assert_eq!(status, 400, "query {} should be rejected", query);
        assert!(!error_message(&error).is_empty());
    }
}

/// Embedding outages surface as 500 without storing anything.
#[tokio::test]
async fn test_embedder_outage_is_server_error() {
    let harness = TestHarness::new();
    let embedder = Arc::new(MockEmbedder::new(harness.settings.embedding.dimension));
    embedder.set_failing(true);
    let server = TestServer::start(harness.app_state(embedder.clone())).await;
    let client = reqwest::Client::new();

    let (status, error) = send(
        client
            .post(server.url("/get_similar_disasters"))
            .json(&json!({"description": "flooding"})),
    )
    .await;
    assert_eq!(status, 500);
    assert!(error_message(&error).contains("upstream unavailable"));

    let (status, _) = send(
        client
            .post(server.url("/detect"))
            .json(&json!({"image_url": "https://images.example.org/a.jpg"})),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(harness.store.stats().unwrap().event_count, 0);
}

/// Store outages surface as 500 on every read and write path.
#[tokio::test]
async fn test_store_outage_is_server_error() {
    let harness = TestHarness::new();
    let dimension = harness.settings.embedding.dimension;
    let state = AppState::new(
        Arc::new(UnavailableStore::new(dimension)),
        Arc::new(HashEmbedder::new(dimension).unwrap()),
        Arc::new(MockClassifier::new()),
        &harness.settings,
    )
    .unwrap();
    let server = TestServer::start(state).await;
    let client = reqwest::Client::new();

    let (status, error) = send(
        client
            .post(server.url("/get_similar_disasters"))
            .json(&json!({"description": "flooding"})),
    )
    .await;
    assert_eq!(status, 500);
    assert!(error_message(&error).contains("store unavailable"));

    let (status, error) = send(client.get(server.url("/api/disasters"))).await;
    assert_eq!(status, 500);
    assert!(error_message(&error).contains("store unavailable"));

    let (status, _) = send(
        client
            .post(server.url("/detect"))
            .json(&json!({"image_url": "https://images.example.org/a.jpg"})),
    )
    .await;
    assert_eq!(status, 500);
}

/// Text without word characters is still a valid description.
#[tokio::test]
async fn test_symbol_only_description_is_accepted() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;

    let (status, body) = send(
        reqwest::Client::new()
            .post(server.url("/get_similar_disasters"))
            .json(&json!({"description": "???"})),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_without_source() {
    let harness = TestHarness::new();
    let server = TestServer::start(harness.app_state(harness.embedder())).await;

    let (status, error) = send(reqwest::Client::new().post(server.url("/api/ingest"))).await;
    assert_eq!(status, 500);
    assert!(error_message(&error).contains("imagery"));
}

#[tokio::test]
async fn test_ingest_rejects_bad_overrides() {
    let harness = TestHarness::new();
    let source = Arc::new(StaticImagerySource::new(flooded_scene(4, 4)));
    let server = TestServer::start(harness.app_state_with_ingestion(source)).await;
    let client = reqwest::Client::new();

    for body in [
        json!({"bbox": "nope"}),
        json!({"days": 0}),
        json!({"days": 4294967295u64}),
    ] {
        let (status, error) = send(client.post(server.url("/api/ingest")).json(&body)).await;
        assert_eq!(status, 400, "body {} should be rejected", body);
        assert!(!error_message(&error).is_empty());
    }
    assert_eq!(harness.store.stats().unwrap().event_count, 0);
}

/// Reopening with another embedding width is refused until reindexed.
#[test]
fn test_dimension_change_is_refused() {
    let harness = TestHarness::with_dimension(8);
    let db_path = harness.db_path();
    let TestHarness {
        _temp_dir: temp_dir,
        store,
        ..
    } = harness;
    drop(store);

    let result = RocksEventStore::open(&db_path, StoreConfig::new(16));
    assert!(matches!(
        result,
        Err(StorageError::SchemaMismatch {
            stored: 8,
            configured: 16
        })
    ));
    drop(temp_dir);
}
