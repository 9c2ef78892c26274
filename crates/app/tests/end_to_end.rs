//! End-to-end flows: bridge, typed worker API, lifecycle tracking,
//! preference storage and tree filtering against a scripted worker.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use postwhale_application::{
    ActionInvoker, ApplicationError, BridgeError, Clock, ConfigRepository, FavoritesRepository,
    RequestLifecycleStore, WorkerApi, load_catalog, save_preset,
};
use postwhale_domain::{
    EditableConfig, FilterCriteria, ItemKind, KeyValueParam, RequestErrorKind, RequestState,
    ViewMode, filter_tree,
};
use postwhale_infrastructure::{
    Bridge, FileKeyValueStore, FixedClock, InMemoryKeyValueStore, SystemClock,
};

fn clock() -> FixedClock {
    FixedClock(SystemClock.now())
}

/// Answers calls the way the real worker would for a tiny catalog.
fn answer(action: &str, data: &Value) -> Value {
    match action {
        "echo" => data.clone(),
        "getRepositories" => json!({"data": [
            {"id": 1, "name": "shop", "path": "/src/shop"},
            {"id": 2, "name": "billing", "path": "/src/billing"}
        ]}),
        "getAllServices" => json!({"data": [
            {"id": 10, "repoId": 1, "serviceId": "orders", "name": "orders", "port": 8080},
            {"id": 20, "repoId": 2, "serviceId": "invoices", "name": "invoices", "port": 8081}
        ]}),
        "getAllEndpoints" => json!({"data": [
            {"id": 100, "serviceId": 10, "method": "GET", "path": "/orders/{orderId}"},
            {"id": 101, "serviceId": 10, "method": "POST", "path": "/orders"},
            {"id": 200, "serviceId": 20, "method": "GET", "path": "/invoices"}
        ]}),
        "getAllSavedRequests" => json!({"data": []}),
        "saveSavedRequest" => {
            let mut saved = data.clone();
            saved["id"] = json!(42);
            json!({"data": saved})
        }
        other => json!({"success": false, "error": format!("unknown action: {other}")}),
    }
}

fn spawn_worker(bridge: &Bridge) {
    let (bridge_end, worker_end) = tokio::io::duplex(1024);
    let (reader, writer) = tokio::io::split(bridge_end);
    bridge.attach(reader, writer);

    tokio::spawn(async move {
        let (worker_read, mut worker_write) = tokio::io::split(worker_end);
        let mut lines = BufReader::new(worker_read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let call: Value = serde_json::from_str(&line).expect("call is JSON");
            let action = call["action"].as_str().expect("call has an action");

            let mut response = answer(action, &call["data"]);
            if !response.is_object() {
                response = json!({"data": response});
            }
            response["requestId"] = call["requestId"].clone();

            let mut frame = serde_json::to_vec(&response).unwrap();
            frame.push(b'\n');
            if worker_write.write_all(&frame).await.is_err() {
                break;
            }
        }
    });
}

#[tokio::test]
async fn invoke_is_tracked_by_the_lifecycle_store() {
    let bridge = Arc::new(Bridge::default());
    spawn_worker(&bridge);
    let lifecycle = RequestLifecycleStore::<Value, Value, FixedClock>::new(clock());

    let result = lifecycle
        .send("echo", json!({"v": 1}), async {
            bridge
                .invoke("echo", json!({"v": 1}))
                .await
                .map_err(ApplicationError::from)
        })
        .await
        .unwrap();

    assert_eq!(result, json!({"v": 1}));
    let entry = lifecycle.get("echo").await.unwrap();
    assert!(matches!(entry.state, RequestState::Succeeded));
    assert_eq!(entry.request, Some(json!({"v": 1})));
    assert_eq!(entry.response, Some(json!({"v": 1})));
    assert_eq!(bridge.pending_calls(), 0);
}

#[tokio::test]
async fn remote_failure_is_recorded_on_the_target() {
    let bridge = Arc::new(Bridge::default());
    spawn_worker(&bridge);
    let lifecycle = RequestLifecycleStore::<Value, Value, FixedClock>::new(clock());

    let error = lifecycle
        .send("bogus", Value::Null, async {
            bridge
                .invoke("bogus", Value::Null)
                .await
                .map_err(ApplicationError::from)
        })
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ApplicationError::Bridge(BridgeError::RemoteError(ref message)) if message == "unknown action: bogus"
    ));
    match lifecycle.get("bogus").await.unwrap().state {
        RequestState::Failed { kind, message } => {
            assert_eq!(kind, RequestErrorKind::Remote);
            assert_eq!(message, "unknown action: bogus");
        }
        other => panic!("expected a failed state, got {other:?}"),
    }
}

#[tokio::test]
async fn catalog_loads_and_filters_with_persisted_favorites() {
    let dir = tempdir().expect("Failed to create temp directory");
    let bridge = Arc::new(Bridge::default());
    spawn_worker(&bridge);

    let catalog = load_catalog(&WorkerApi::new(Arc::clone(&bridge))).await;
    assert!(catalog.errors.is_empty(), "{:?}", catalog.errors);
    assert_eq!(catalog.repositories.len(), 2);
    assert_eq!(catalog.endpoints.len(), 3);

    let preferences = dir.path().join("preferences.json");
    let favorites = FavoritesRepository::new(FileKeyValueStore::new(&preferences));
    assert!(favorites.toggle(ItemKind::Endpoint, 101).await.unwrap());

    // A fresh store over the same file sees the star.
    let reloaded = FavoritesRepository::new(FileKeyValueStore::new(&preferences))
        .load()
        .await
        .unwrap();

    let visible = filter_tree(
        &catalog.repositories,
        &catalog.services,
        &catalog.endpoints,
        ViewMode::Favorites,
        "",
        &FilterCriteria::default(),
        &reloaded,
    );
    assert_eq!(visible.repositories.iter().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(visible.services.iter().copied().collect::<Vec<_>>(), vec![10]);
    assert_eq!(visible.endpoints.iter().copied().collect::<Vec<_>>(), vec![101]);

    let searched = filter_tree(
        &catalog.repositories,
        &catalog.services,
        &catalog.endpoints,
        ViewMode::All,
        "invoices",
        &FilterCriteria::default(),
        &reloaded,
    );
    assert_eq!(searched.repositories.iter().copied().collect::<Vec<_>>(), vec![2]);
    assert!(searched.expanded_repositories.contains(&2));
}

#[tokio::test]
async fn preset_save_adopts_worker_id_and_local_edits_survive_reopen() {
    let dir = tempdir().expect("Failed to create temp directory");
    let bridge = Arc::new(Bridge::default());
    spawn_worker(&bridge);
    let api = WorkerApi::new(Arc::clone(&bridge));

    let catalog = load_catalog(&api).await;
    let endpoint = catalog.endpoints.iter().find(|e| e.id == 100).unwrap();

    let mut config = EditableConfig::anonymous(endpoint);
    config.path_params.insert("orderId".to_string(), "7".to_string());
    assert!(config.is_dirty());

    let saved = save_preset(&api, &mut config, "order seven").await.unwrap();
    assert_eq!(saved.id, 42);
    assert_eq!(config.id, "42");
    assert!(config.is_saved_request());
    assert!(!config.is_dirty());
    assert_eq!(config.resolve(&endpoint.path).unwrap().path, "/orders/7");

    config.body = "{\"note\": \"draft\"}".to_string();
    let path = dir.path().join("preferences.json");
    ConfigRepository::new(FileKeyValueStore::new(&path))
        .save(&mut config)
        .await
        .unwrap();

    let reopened = ConfigRepository::new(FileKeyValueStore::new(&path))
        .load("42")
        .await
        .unwrap()
        .expect("config was persisted");
    assert_eq!(reopened.body, "{\"note\": \"draft\"}");
    assert_eq!(reopened.path_params.get("orderId").map(String::as_str), Some("7"));
    assert!(!reopened.is_dirty());
}

#[tokio::test]
async fn clearing_configs_keeps_favorites_in_the_shared_store() {
    let bridge = Arc::new(Bridge::default());
    spawn_worker(&bridge);
    let api = WorkerApi::new(Arc::clone(&bridge));
    let store = InMemoryKeyValueStore::new();

    let catalog = load_catalog(&api).await;
    let endpoint = catalog.endpoints.iter().find(|e| e.id == 101).unwrap();
    let mut config = EditableConfig::anonymous(endpoint);
    config.body = "{\"item\": 1}".to_string();
    save_preset(&api, &mut config, "new order").await.unwrap();

    let configs = ConfigRepository::new(store.clone());
    config.headers.push(KeyValueParam::new("X-Trace", "1"));
    assert!(config.is_dirty());
    configs.save(&mut config).await.unwrap();
    assert!(!config.is_dirty());

    let favorites = FavoritesRepository::new(store.clone());
    assert!(favorites.toggle(ItemKind::Service, 10).await.unwrap());

    assert_eq!(configs.clear_all().await.unwrap(), 1);
    assert!(configs.load("42").await.unwrap().is_none());
    assert!(favorites.load().await.unwrap().services.contains(&10));
    assert_eq!(store.len().await, 1);
}
