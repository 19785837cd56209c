//! Axum JSON surface over the mention extraction pipeline.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mention_core::{ExecutionId, Match};
use mention_sync::MentionPipeline;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "mention-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MentionPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<MentionPipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub execution_id: ExecutionId,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReprocessRequest {
    #[serde(default)]
    pub topic: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/scan", post(scan_handler))
        .route("/extract", post(extract_handler))
        .route("/reprocess", post(reprocess_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "mention-web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.pipeline.cache().stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "cache": stats,
    }))
    .into_response()
}

async fn scan_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Response {
    let matches = state.pipeline.scan(&req.text).await;
    Json(ScanResponse { matches }).into_response()
}

async fn extract_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Response {
    match state
        .pipeline
        .extract_and_store(req.execution_id, &req.text)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => server_error(err),
    }
}

async fn reprocess_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let req = if body.is_empty() {
        ReprocessRequest::default()
    } else {
        match serde_json::from_slice::<ReprocessRequest>(&body) {
            Ok(req) => req,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        }
    };
    match state.pipeline.reprocess_all(req.topic.as_deref()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => server_error(err),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}
