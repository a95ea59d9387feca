use crate::pipeline::{CrushSync, SyncResult};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "crush-sync";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CrushSync>,
}

impl AppState {
    pub fn new(pipeline: Arc<CrushSync>) -> Self {
        Self { pipeline }
    }
}

/// Builds the HTTP trigger: a health route and `/refresh`, which runs one sync.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/refresh", get(refresh).post(refresh))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "sync trigger listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "online", "service": SERVICE_NAME }))
}

/// Runs the sync on its own task so a panic inside it becomes a 500 instead of a
/// dropped connection. Handled outcomes, failed ones included, are 200.
async fn refresh(State(state): State<AppState>) -> Response {
    let pipeline = state.pipeline.clone();
    match tokio::spawn(async move { pipeline.sync().await }).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(error = %e, "sync task did not complete");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncResult::error(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down sync trigger");
}
