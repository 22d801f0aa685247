//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ObjectId, StreamId};
use event_source::EventId;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use store::{CursorStore, EscrowUpdate, InMemoryStore, LockedUpdate, ProjectionStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_store() -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = Arc::new(api::AppState::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        50,
        2,
    ));
    (api::create_app(state, get_metrics_handle()), store)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn seed_locks(store: &InMemoryStore, ids: &[&str]) {
    for id in ids {
        store
            .upsert_locked(LockedUpdate {
                object_id: ObjectId::new(*id),
                key_id: Some(format!("key-{id}")),
                creator: Some("C1".to_string()),
                item_id: Some(format!("item-{id}")),
                deleted: false,
            })
            .await
            .unwrap();
    }
}

fn ids(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup_with_store();

    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["streams"], 2);
}

#[tokio::test]
async fn test_locked_pagination_walks_descending() {
    let (app, store) = setup_with_store();
    seed_locks(&store, &["L1", "L2", "L3"]).await;

    let (status, first) = get(&app, "/locked?deleted=false&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&first), vec![3, 2]);
    assert_eq!(first["nextCursor"], 2);

    let (status, second) = get(&app, "/locked?deleted=false&limit=2&cursor=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&second), vec![1]);
}

#[tokio::test]
async fn test_locked_record_shape() {
    let (app, store) = setup_with_store();
    seed_locks(&store, &["L1"]).await;

    let (_, body) = get(&app, "/locked?objectId=L1").await;
    let record = &body["data"][0];

    assert_eq!(record["objectId"], "L1");
    assert_eq!(record["keyId"], "key-L1");
    assert_eq!(record["creator"], "C1");
    assert_eq!(record["itemId"], "item-L1");
    assert_eq!(record["deleted"], false);
}

#[tokio::test]
async fn test_empty_page_has_null_cursor() {
    let (app, _) = setup_with_store();

    let (status, body) = get(&app, "/locked").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));
    assert!(body["nextCursor"].is_null());
}

#[tokio::test]
async fn test_invalid_boolean_filter_is_rejected() {
    let (app, store) = setup_with_store();
    seed_locks(&store, &["L1"]).await;

    let (status, body) = get(&app, "/locked?deleted=notabool").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("deleted"));
}

#[tokio::test]
async fn test_id_filter_selects_one_record() {
    let (app, store) = setup_with_store();
    seed_locks(&store, &["L1", "L2", "L3"]).await;

    let (status, body) = get(&app, "/locked?id=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![2]);
    assert_eq!(body["data"][0]["objectId"], "L2");

    let (status, body) = get(&app, "/locked?id=2.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("filter id"));
}

#[tokio::test]
async fn test_unknown_filter_key_is_ignored() {
    let (app, store) = setup_with_store();
    seed_locks(&store, &["L1", "L2"]).await;

    let (status, body) = get(&app, "/locked?colour=blue&sender=nobody").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![2, 1]);
}

#[tokio::test]
async fn test_invalid_pagination_is_rejected() {
    let (app, _) = setup_with_store();

    for uri in [
        "/locked?limit=0",
        "/locked?limit=many",
        "/escrows?sort=random",
        "/escrows?cursor=last",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_escrow_filters() {
    let (app, store) = setup_with_store();

    for (id, sender) in [("E1", "S1"), ("E2", "S2"), ("E3", "S1")] {
        let mut update = EscrowUpdate::new(ObjectId::new(id));
        update.sender = Some(sender.to_string());
        update.recipient = Some("R".to_string());
        store.upsert_escrow(update).await.unwrap();
    }
    let mut cancelled = EscrowUpdate::new(ObjectId::new("E3"));
    cancelled.cancelled = true;
    store.upsert_escrow(cancelled).await.unwrap();

    let (_, by_sender) = get(&app, "/escrows?sender=S1&sort=asc").await;
    assert_eq!(ids(&by_sender), vec![1, 3]);

    let (_, open) = get(&app, "/escrows?sender=S1&cancelled=false").await;
    assert_eq!(ids(&open), vec![1]);
    assert_eq!(open["data"][0]["swapped"], false);
}

#[tokio::test]
async fn test_cursors_endpoint() {
    let (app, store) = setup_with_store();
    store
        .save(&StreamId::new("0xabc::lock"), &EventId::new("T7", 2))
        .await
        .unwrap();

    let (status, body) = get(&app, "/cursors").await;

    assert_eq!(status, StatusCode::OK);
    let cursors = body.as_array().unwrap();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0]["streamId"], "0xabc::lock");
    assert_eq!(cursors[0]["position"]["txDigest"], "T7");
    assert_eq!(cursors[0]["position"]["eventSeq"], "2");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup_with_store();
    get(&app, "/locked").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
