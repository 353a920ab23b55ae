//! Hosts a TorchScript jet classifier over HTTP for `RemoteClient`.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::post,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use jet_image_tagger::{
    client::{InferRequest, InferResponse, INFER_ROUTE},
    config::{CHANNELS, DEFAULT_GRID_SIZE},
    request::scores_from_tensor,
    LocalClient,
};

#[derive(Clone)]
struct AppState {
    mdl: Arc<LocalClient>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, e: impl ToString) -> ApiError {
    (status, Json(json!({ "error": e.to_string() })))
}

async fn infer(
    State(state): State<AppState>,
    Json(payload): Json<InferRequest>,
) -> Result<Json<InferResponse>, ApiError> {
    let shape = payload.shape.clone();
    let input = payload
        .into_tensor()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let mdl = Arc::clone(&state.mdl);
    let scores = tokio::task::spawn_blocking(move || {
        mdl.forward(&input).and_then(|out| scores_from_tensor(&out))
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    tracing::debug!(?shape, n_scores = scores.len(), "served inference");
    Ok(Json(InferResponse { scores }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let model_path = std::env::var("MODEL_PATH").map_err(|_| anyhow::anyhow!("MODEL_PATH not set"))?;
    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8500);
    let grid: usize = std::env::var("GRID_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_GRID_SIZE);

    // load() runs a warmup forward on an empty image
    let mdl = LocalClient::load(&model_path, grid, CHANNELS)?;
    tracing::info!(n_classes = mdl.n_classes, "warmup forward ok");

    let state = AppState { mdl: Arc::new(mdl) };

    let app = axum::Router::new()
        .route(INFER_ROUTE, post(infer))
        // a 224x224x3 image as JSON is well past the 2 MB default
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
