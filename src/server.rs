//! JSON HTTP API over the same [`App`] the CLI uses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ingest` | Index a file: `{ "path", "user_id" }` |
//! | `POST` | `/ask` | Answer a question: `{ "question", "user_id" }` |
//! | `POST` | `/topics` | Topics of a transcript: `{ "messages": [{ "role", "content" }] }` |
//! | `GET`  | `/documents?user_id=` | A user's ingested files |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "input_error", "message": "invalid input: question is empty" } }
//! ```
//!
//! Malformed JSON bodies and query strings are `input_error` too.
//!
//! | Code | Status |
//! |------|--------|
//! | `input_error` | 400 |
//! | `generation_blocked` | 422 |
//! | `embedding_failure` | 502 |
//! | `index_unavailable`, `generation_unavailable` | 503 |
//! | `dimension_mismatch`, `persistence_failure` | 500 |

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use conecta_core::models::{Answer, ConversationMessage, Document};
use conecta_core::RagError;

use crate::app::{App, TopicsResponse};
use crate::config::Config;

/// Bind `[server].bind` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::open(config).await?);
    let router = router(app.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    if let Ok(app) = Arc::try_unwrap(app) {
        app.close().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/topics", post(handle_topics))
        .route("/documents", get(handle_documents))
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        RagError::input(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        RagError::input(rejection.body_text()).into()
    }
}

pub fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::Input(_) => StatusCode::BAD_REQUEST,
        RagError::GenerationBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::Embedding(_) => StatusCode::BAD_GATEWAY,
        RagError::IndexUnavailable(_) | RagError::GenerationUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RagError::DimensionMismatch { .. } | RagError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    path: PathBuf,
    user_id: String,
}

async fn handle_ingest(
    State(app): State<Arc<App>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<Document>, AppError> {
    let Json(req) = payload?;
    Ok(Json(app.ingest_file(&req.path, &req.user_id).await?))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    user_id: String,
}

async fn handle_ask(
    State(app): State<Arc<App>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = payload?;
    Ok(Json(app.ask(&req.question, &req.user_id).await?))
}

// ============ POST /topics ============

#[derive(Deserialize)]
struct TopicsRequest {
    messages: Vec<ConversationMessage>,
}

async fn handle_topics(
    State(app): State<Arc<App>>,
    payload: Result<Json<TopicsRequest>, JsonRejection>,
) -> Result<Json<TopicsResponse>, AppError> {
    let Json(req) = payload?;
    Ok(Json(app.extract_topics(&req.messages).await?))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct DocumentsQuery {
    user_id: String,
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
}

async fn handle_documents(
    State(app): State<Arc<App>>,
    query: Result<Query<DocumentsQuery>, QueryRejection>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let Query(query) = query?;
    if query.user_id.trim().is_empty() {
        return Err(RagError::input("user_id is empty").into());
    }
    let documents = app.documents(&query.user_id).await?;
    Ok(Json(DocumentsResponse { documents }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&RagError::input("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&RagError::blocked(None)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&RagError::embedding("x")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&RagError::index_unavailable("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&RagError::generation_unavailable("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&RagError::persistence("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
