//! REST API for the ledger agent
//!
//! Thin adapter over the Analyze operation plus the manual-save and history
//! lookups. All replies share the [`ApiResponse`] envelope.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::memory::ResultCache;
use crate::models::AnalyzeRequest;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SaveManualRequest {
    pub user_id: String,
    pub question: String,
    pub analysis: String,
    #[serde(default)]
    pub chart_data: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryRequest {
    pub session_id: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub manual_cache: ResultCache,
    pub project: String,
    pub model: String,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "project": state.project,
        "model": state.model,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analyze Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let request_id = Uuid::new_v4();

    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("question must not be empty".into())),
        );
    }

    info!(
        %request_id,
        user_id = %req.user_id,
        session_id = %req.session_id,
        "Received analyze request"
    );

    match state.orchestrator.analyze(req).await {
        Ok(outcome) => {
            if let (Some(err), true) = (&outcome.error, outcome.answer_text.trim().is_empty()) {
                warn!(%request_id, error = %err, "Workflow ended without an answer");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(err.to_string())),
                );
            }
            (StatusCode::OK, Json(ApiResponse::success(outcome)))
        }
        Err(OrchestrationError::InvalidRequest(message)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(message)),
        ),
        Err(e) => {
            error!(%request_id, error = %e, kind = %e.kind(), "Analyze request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!(
                    "Internal server error (request {})",
                    request_id
                ))),
            )
        }
    }
}

/// =============================
/// Manual Save Endpoint
/// =============================

async fn save_manual(
    State(state): State<ApiState>,
    Json(req): Json<SaveManualRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("question must not be empty".into())),
        );
    }

    match state
        .manual_cache
        .save_manual(&req.user_id, &req.question, &req.analysis, &req.chart_data)
        .await
    {
        Ok(key) => {
            info!(user_id = %req.user_id, key = %key, "Manual analysis saved");
            (
                StatusCode::OK,
                Json(ApiResponse::success(json!({ "status": "saved", "key": key }))),
            )
        }
        Err(e) => {
            error!(error = %e, "Manual save failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to save analysis".into())),
            )
        }
    }
}

/// =============================
/// History Endpoint
/// =============================

async fn history(
    State(state): State<ApiState>,
    Json(req): Json<HistoryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.history().recent(&req.session_id).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({
                "session_id": req.session_id,
                "history": entries,
            }))),
        ),
        Err(e) => {
            error!(error = %e, "History lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to load history".into())),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/analyze", post(analyze))
        .route("/api/v1/save-manual", post(save_manual))
        .route("/api/v1/history", post(history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
