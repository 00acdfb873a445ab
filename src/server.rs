use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::render::{Frame, RenderConfig, frame_to_svg};
use crate::snapshot::{FeedItem, HealthReport};
use crate::supervisor::SupervisorHandle;

/// Read-only views the HUD server hands out
#[derive(Clone)]
pub struct HudState {
    frames: watch::Receiver<Frame>,
    feed: watch::Receiver<Vec<FeedItem>>,
    health: watch::Receiver<Option<HealthReport>>,
    render: RenderConfig,
}

impl HudState {
    pub fn new(handle: &SupervisorHandle, render: RenderConfig) -> Self {
        Self {
            frames: handle.frames(),
            feed: handle.feed(),
            health: handle.health(),
            render,
        }
    }
}

/// Routes:
///
/// - `GET /frame`: latest frame and stats as JSON
/// - `GET /hud.svg`: latest frame rendered as SVG
/// - `GET /feed`: merged telemetry feed
/// - `GET /health`: last health report, or `null`
pub fn router(state: HudState) -> Router {
    Router::new()
        .route("/frame", get(frame))
        .route("/hud.svg", get(svg))
        .route("/feed", get(feed))
        .route("/health", get(health))
        .with_state(state)
}

async fn frame(State(state): State<HudState>) -> Json<Frame> {
    Json(state.frames.borrow().clone())
}

async fn svg(State(state): State<HudState>) -> impl IntoResponse {
    let frame = state.frames.borrow().clone();
    (
        [(header::CONTENT_TYPE, "image/svg+xml")],
        frame_to_svg(&frame, &state.render),
    )
}

async fn feed(State(state): State<HudState>) -> Json<Vec<FeedItem>> {
    Json(state.feed.borrow().clone())
}

async fn health(State(state): State<HudState>) -> Json<Option<HealthReport>> {
    Json(state.health.borrow().clone())
}

/// Serve the live HUD until Ctrl+C, then tear the supervisor down
pub async fn serve(
    mut handle: SupervisorHandle,
    render: RenderConfig,
    port: u16,
) -> anyhow::Result<()> {
    let app = router(HudState::new(&handle, render));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "HUD server listening");
    println!("HUD server running at http://localhost:{port}/hud.svg");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    handle.shutdown().await;
    Ok(())
}
