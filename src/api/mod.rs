use axum::{
    routing::{get, post},
    Router,
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::commands::invoice;
use crate::database::Database;
use crate::providers::traits::CompletionProvider;
use crate::rag::engine::AnswerEngine;
use crate::session::{ChatRole, ChatSession};

/// Shared state for the HTTP surface. The session sits behind one RwLock
/// and every handler takes the write side for its full duration, which
/// keeps the single-request-at-a-time model of the interactive UI.
#[derive(Clone)]
pub struct AppState {
    provider: Arc<Box<dyn CompletionProvider + Send + Sync>>,
    engine: Arc<AnswerEngine>,
    db: Database,
    session: Arc<RwLock<ChatSession>>,
    reference_date: NaiveDate,
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 1000))]
    message: String,
}

#[derive(Deserialize, Validate)]
pub struct UploadRequest {
    #[validate(length(min = 1, max = 4096))]
    image_path: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    status: String,
    invoice_id: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    role: String,
    content: String,
    timestamp: String,
}

#[derive(Serialize)]
pub struct ApiResponse {
    status: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiResponse>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse {
            status: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse {
            status: message.into(),
        }),
    )
}

/// Create and configure the API router
pub fn create_api(
    provider: Box<dyn CompletionProvider + Send + Sync>,
    db: Database,
    reference_date: NaiveDate,
) -> Router {
    let engine = AnswerEngine::new(provider.clone(), db.clone(), reference_date);

    let state = AppState {
        provider: Arc::new(provider),
        engine: Arc::new(engine),
        db,
        session: Arc::new(RwLock::new(ChatSession::new())),
        reference_date,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/upload", post(upload_handler))
        .route("/history", get(history_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    request
        .validate()
        .map_err(|e| bad_request(format!("Invalid request: {}", e)))?;

    let mut session = state.session.write().await;

    let (answer, updated_history) = state
        .engine
        .chat(&request.message, session.history())
        .await
        .map_err(|e| internal_error(format!("Chat failed: {}", e)))?;

    session
        .record_exchange(&request.message, &answer, updated_history, &state.db)
        .await;

    Ok(Json(ChatResponse { response: answer }))
}

async fn upload_handler(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<UploadResponse> {
    request
        .validate()
        .map_err(|e| bad_request(format!("Invalid request: {}", e)))?;

    let mut session = state.session.write().await;

    invoice::handle_upload(
        &request.image_path,
        state.provider.as_ref().as_ref(),
        &state.db,
        &mut session,
        state.reference_date,
    )
    .await
    .map_err(internal_error)?;

    Ok(Json(UploadResponse {
        status: "stored".to_string(),
        invoice_id: session.current_invoice_id(),
    }))
}

async fn history_handler(State(state): State<AppState>) -> ApiResult<Vec<HistoryEntry>> {
    let session = state.session.read().await;

    let entries = session
        .history()
        .iter()
        .filter(|turn| turn.role != ChatRole::System)
        .map(|turn| HistoryEntry {
            role: turn.role.as_db_str().to_string(),
            content: turn.content.clone(),
            timestamp: turn.timestamp.to_rfc3339(),
        })
        .collect();

    Ok(Json(entries))
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "ok".to_string(),
    })
}
