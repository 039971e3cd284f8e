//! HTTP API over the course assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question, optionally within a session |
//! | `GET`  | `/api/courses` | Catalog statistics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `service_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend
//! served from elsewhere can call the API.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::assistant::{CourseAssistant, QueryResponse};
use crate::config::Config;
use crate::error::Error;

/// Build the assistant from `config`, ingest the docs folder, and serve
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(CourseAssistant::from_config(config).await?);

    let report = assistant.ingest_configured_docs().await?;
    println!(
        "Loaded {} courses ({} chunks), {} skipped, {} failed",
        report.added.len(),
        report.chunks_written,
        report.skipped.len(),
        report.failed.len()
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Course assistant listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(assistant)).await?;

    Ok(())
}

/// The application router, with CORS applied.
pub fn router(assistant: Arc<CourseAssistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(assistant)
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidRequest(_) | Error::Parse { .. } => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            Error::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
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

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_query(
    State(assistant): State<Arc<CourseAssistant>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let response = assistant
        .query(&request.query, request.session_id.as_deref())
        .await?;
    Ok(Json(response))
}

// ============ GET /api/courses ============

#[derive(Serialize)]
struct CourseStatsResponse {
    total_courses: usize,
    course_titles: Vec<String>,
}

async fn handle_courses(
    State(assistant): State<Arc<CourseAssistant>>,
) -> Result<Json<CourseStatsResponse>, AppError> {
    let stats = assistant.catalog_stats().await?;
    Ok(Json(CourseStatsResponse {
        total_courses: stats.course_count,
        course_titles: stats.titles,
    }))
}
