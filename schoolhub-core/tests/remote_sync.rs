//! Remote authority integration
//!
//! Runs a small axum server speaking the snapshot protocol and points an
//! engine at it through `HttpRemoteAuthority`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use schoolhub_core::core_store::model::*;
use schoolhub_core::core_sync::{HttpRemoteAuthority, PullResponse, PushRequest, SyncStatus};
use schoolhub_core::test_utils::{fast_hasher, SchoolFixture};
use schoolhub_core::Engine;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeRemote {
    snapshot: Mutex<Option<serde_json::Value>>,
    reject_pushes: AtomicBool,
    pushes: AtomicUsize,
}

type Shared = Arc<FakeRemote>;

async fn pull(State(remote): State<Shared>) -> Json<PullResponse> {
    let snapshot = remote.snapshot.lock().unwrap().clone();
    Json(PullResponse {
        ok: snapshot.is_some(),
        snapshot,
    })
}

async fn push(State(remote): State<Shared>, Json(body): Json<PushRequest>) -> StatusCode {
    if remote.reject_pushes.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    remote.pushes.fetch_add(1, Ordering::SeqCst);
    *remote.snapshot.lock().unwrap() = Some(body.snapshot);
    StatusCode::NO_CONTENT
}

/// Serve the fake remote on an ephemeral port, returning its base URL
async fn start_remote(remote: Shared) -> String {
    let router = Router::new()
        .route("/state/snapshot", get(pull).put(push))
        .with_state(remote);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn engine_for(url: &str) -> Engine {
    Engine::builder()
        .with_hasher(Arc::new(fast_hasher()))
        .with_remote(Arc::new(HttpRemoteAuthority::new(url)))
        .with_remote_timeout(Duration::from_secs(5))
        .build()
        .await
}

#[tokio::test]
async fn test_mutation_is_pushed_to_remote() {
    let remote = Shared::default();
    let url = start_remote(remote.clone()).await;
    let mut engine = engine_for(&url).await;
    assert!(!engine.bootstrap_report().pulled_remote);

    engine.seed_director("Dana Director").await.unwrap();
    let status = engine.last_sync_ticket().unwrap().wait().await;
    assert_eq!(status, SyncStatus::Succeeded);

    let stored = remote.snapshot.lock().unwrap().clone().unwrap();
    let persons = stored["persons"].as_array().unwrap();
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0]["role"], "director");
    assert_eq!(remote.pushes.load(Ordering::SeqCst), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_startup_pulls_remote_snapshot() {
    let fixture = SchoolFixture::new();
    let text = fixture.store.to_serialized().unwrap();
    let remote = Shared::default();
    *remote.snapshot.lock().unwrap() = Some(serde_json::from_str(&text).unwrap());
    let url = start_remote(remote.clone()).await;

    let mut engine = engine_for(&url).await;
    assert!(engine.bootstrap_report().pulled_remote);
    assert_eq!(engine.store().snapshot(), fixture.store.snapshot());

    // Fixture accounts can sign in against the pulled data
    let token = fixture.login(&mut engine, "teacher.a").await;
    let state = engine.state(&token).await.unwrap();
    assert!(state.snapshot.contains_person(&fixture.student_a.id));

    // Unchanged data is not pushed back
    assert_eq!(remote.pushes.load(Ordering::SeqCst), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_rejected_push_keeps_local_state() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("schoolhub.json");
    let remote = Shared::default();
    remote.reject_pushes.store(true, Ordering::SeqCst);
    let url = start_remote(remote.clone()).await;

    let mut engine = Engine::builder()
        .with_hasher(Arc::new(fast_hasher()))
        .with_cache_file(cache.clone())
        .with_remote(Arc::new(HttpRemoteAuthority::new(url.as_str())))
        .build()
        .await;

    let credentials = engine.seed_director("Dana Director").await.unwrap();
    match engine.last_sync_ticket().unwrap().wait().await {
        SyncStatus::Failed(reason) => assert!(reason.contains("remote"), "reason: {}", reason),
        other => panic!("expected a failed push, got {:?}", other),
    }
    assert!(engine.store().contains::<Person>(&credentials.person_id));
    assert!(engine.telemetry().sync_failures >= 1);

    // The local cache still received the write
    engine.flush().await;
    let cached = std::fs::read_to_string(&cache).unwrap();
    assert!(cached.contains(&credentials.login));

    // Once the remote recovers, the next sync catches it up
    remote.reject_pushes.store(false, Ordering::SeqCst);
    let status = engine.sync_now().unwrap().wait().await;
    assert_eq!(status, SyncStatus::Succeeded);
    assert!(remote.snapshot.lock().unwrap().is_some());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_remote_falls_back_to_cache() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("schoolhub.json");

    let fixture = SchoolFixture::new();
    std::fs::write(&cache, fixture.store.to_serialized().unwrap()).unwrap();

    // Nothing listens on this port once the listener is dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let engine = Engine::builder()
        .with_hasher(Arc::new(fast_hasher()))
        .with_cache_file(cache)
        .with_remote(Arc::new(HttpRemoteAuthority::new(url.as_str())))
        .with_remote_timeout(Duration::from_secs(2))
        .build()
        .await;

    let report = engine.bootstrap_report();
    assert!(report.loaded_local);
    assert!(!report.pulled_remote);
    assert_eq!(engine.store().all::<Person>().len(), 8);
    engine.shutdown().await;
}
