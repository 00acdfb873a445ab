//! End-to-end runs against a mock dashboard API served by axum.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use sentinel_hud::config::HudConfig;
use sentinel_hud::fetcher::HttpFetcher;
use sentinel_hud::render::Frame;
use sentinel_hud::server::{HudState, router};
use sentinel_hud::supervisor::{Supervisor, SupervisorHandle, SupervisorState};

/// Mock backend; the graph endpoint fails while `broken` is set
#[derive(Clone, Default)]
struct Backend {
    broken: Arc<AtomicBool>,
}

async fn graph(State(backend): State<Backend>) -> Response {
    if backend.broken.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(json!({
        "entities": {"orchestrator": {}, "researcher": {}, "scout": {}, "visual": {}},
        "relations": [
            {"source": "orchestrator", "target": "researcher", "relation": "delegates_to"},
            {"source": "orchestrator", "target": "scout", "relation": "delegates_to"},
            {"source": "ghost", "target": "visual", "relation": "haunts"}
        ]
    }))
    .into_response()
}

async fn telemetry() -> Json<serde_json::Value> {
    Json(json!({
        "findings": [
            {"agent_id": "scout", "content": "found a lead", "timestamp": "2024-05-01T10:00:00"}
        ],
        "insights": [
            {"agent_id": "researcher", "content": "pattern confirmed", "timestamp": "2024-05-01T11:00:00"}
        ]
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "Sovereign and Nominal"}))
}

async fn spawn_backend(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/dashboard/graph", get(graph))
        .route("/api/dashboard/telemetry", get(telemetry))
        .route("/api/health", get(health))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn start(api_base: String) -> SupervisorHandle {
    let config = HudConfig {
        api_base,
        poll_interval_ms: 100,
        tick_rate_hz: 120,
        request_timeout_ms: 1000,
        ..HudConfig::default()
    };
    let fetcher = HttpFetcher::new(&config.api_base, config.request_timeout()).unwrap();
    Supervisor::new(config, fetcher).start().unwrap()
}

async fn wait_for(
    frames: &mut watch::Receiver<Frame>,
    predicate: impl Fn(&Frame) -> bool,
) -> Frame {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let frame = frames.borrow_and_update();
                if predicate(&*frame) {
                    return frame.clone();
                }
            }
            frames.changed().await.expect("frame stream closed");
        }
    })
    .await
    .expect("timed out waiting for frame")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polls_api_and_streams_frames() {
    let api = spawn_backend(Backend::default()).await;
    let mut handle = start(api);

    let mut frames = handle.frames();
    let frame = wait_for(&mut frames, |f| f.nodes.len() == 4).await;
    assert_eq!(handle.state(), SupervisorState::Running);
    assert_eq!(frame.stats.count, 4);
    assert!(frame.stats.latency_ms.is_some());
    // The relation from the unknown "ghost" entity is dropped.
    assert_eq!(frame.connections.len(), 2);

    let mut feed = handle.feed();
    tokio::time::timeout(Duration::from_secs(10), feed.wait_for(|items| items.len() == 2))
        .await
        .expect("timed out waiting for feed")
        .unwrap();
    assert_eq!(feed.borrow()[0].content, "pattern confirmed");

    let health = handle.health().borrow().clone();
    assert_eq!(health.map(|h| h.status), Some("Sovereign and Nominal".to_string()));

    handle.shutdown().await;
    assert_eq!(handle.state(), SupervisorState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_outage_freezes_layout_without_failing() {
    let backend = Backend::default();
    backend.broken.store(true, Ordering::SeqCst);
    let api = spawn_backend(backend.clone()).await;
    let mut handle = start(api);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(handle.state(), SupervisorState::Uninitialized);
    assert!(handle.latest().nodes.is_empty());

    backend.broken.store(false, Ordering::SeqCst);
    let mut frames = handle.frames();
    let first = wait_for(&mut frames, |f| f.nodes.len() == 4).await;

    backend.broken.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(350)).await;
    let frozen = handle.latest();
    assert_eq!(handle.state(), SupervisorState::Running);
    assert_eq!(frozen.nodes.len(), 4);
    assert!(frozen.stats.generation >= first.stats.generation);

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_api_never_initializes() {
    let mut handle = start("http://127.0.0.1:9".to_string());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.state(), SupervisorState::Uninitialized);
    handle.shutdown().await;
    assert_eq!(handle.state(), SupervisorState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hud_server_exposes_frames() {
    let api = spawn_backend(Backend::default()).await;
    let mut handle = start(api);
    let mut frames = handle.frames();
    wait_for(&mut frames, |f| f.nodes.len() == 4).await;

    let app = router(HudState::new(&handle, Default::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let frame: serde_json::Value = client
        .get(format!("http://{addr}/frame"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(frame["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(frame["stats"]["count"], 4);

    let svg = client
        .get(format!("http://{addr}/hud.svg"))
        .send()
        .await
        .unwrap();
    assert_eq!(svg.headers()["content-type"], "image/svg+xml");
    let body = svg.text().await.unwrap();
    assert_eq!(body.matches("<circle").count(), 4);

    let health: serde_json::Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "Sovereign and Nominal");

    handle.shutdown().await;
}
