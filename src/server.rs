//! JSON HTTP API for document upload and question answering.
//!
//! # Endpoints
//!
//! | Method   | Path               | Description |
//! |----------|--------------------|-------------|
//! | `POST`   | `/query`           | Ask a question over the indexed documents |
//! | `POST`   | `/upload`          | Upload a document (multipart `file` field) |
//! | `GET`    | `/documents`       | List documents with status and chunk counts |
//! | `DELETE` | `/documents/{id}`  | Delete a document and its chunks |
//! | `GET`    | `/health`          | Liveness and index readiness |
//!
//! # Error Contract
//!
//! Mutating endpoints answer with `{ "success": false, "error": "..." }` and
//! an appropriate status code; a handler failure is never a crash. Ingestion
//! failures additionally land in the document's `status`/`error_message`,
//! visible via `GET /documents`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::RagError;
use crate::extract::{is_supported, mime_for_filename};
use crate::models::Citation;
use crate::pipeline::{Pipeline, QueryOutcome};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the HTTP server.
///
/// Opens the store, rebuilds the in-memory vector index from persisted
/// state, and binds to `[server].bind`. A corrupt index aborts startup:
/// serving queries against untrusted vectors is worse than refusing to
/// start.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    let app = build_router(pipeline, config.server.max_upload_bytes);

    println!("citedocs listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assembles the router. Split from [`run_server`] so callers can mount
/// the routes without binding a socket.
pub fn build_router(pipeline: Arc<Pipeline>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState { pipeline };

    Router::new()
        .route("/query", post(handle_query))
        .route("/upload", post(handle_upload))
        .route("/documents", get(handle_list_documents))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Maps a pipeline error to the status code a client should see.
///
/// Client-side problems (bad format, corrupt file, bad parameters) are 400;
/// upstream provider failures are 502; everything else is 500.
fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::UnsupportedFormat(_)
        | RagError::CorruptDocument(_)
        | RagError::InvalidChunkConfig(_) => StatusCode::BAD_REQUEST,
        RagError::Transient(_) | RagError::Fatal(_) | RagError::GenerationFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        RagError::DimensionMismatch { .. }
        | RagError::IndexCorruption(_)
        | RagError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    k: Option<usize>,
    /// Optional restriction to a set of document ids.
    document_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
struct QueryResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl QueryResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: None,
            citations: None,
            error: Some(message.into()),
        }
    }
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Response {
    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(QueryResponse::failure("query must not be empty")),
        )
            .into_response();
    }

    let filter: Option<HashSet<String>> = req
        .document_ids
        .map(|ids| ids.into_iter().collect());

    match state
        .pipeline
        .query(&req.query, req.k, filter.as_ref())
        .await
    {
        Ok(QueryOutcome::Answered(answer)) => Json(QueryResponse {
            success: true,
            answer: Some(answer.text),
            citations: Some(answer.citations),
            error: None,
        })
        .into_response(),
        Ok(QueryOutcome::NoDocuments) => (
            StatusCode::OK,
            Json(QueryResponse::failure("no documents indexed")),
        )
            .into_response(),
        Ok(QueryOutcome::NothingRelevant) => Json(QueryResponse {
            success: true,
            answer: Some(
                "No relevant information found in the indexed documents for your query."
                    .to_string(),
            ),
            citations: Some(Vec::new()),
            error: None,
        })
        .into_response(),
        Err(e) => (status_for(&e), Json(QueryResponse::failure(e.to_string()))).into_response(),
    }
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadedDocument {
    document_id: String,
    filename: String,
    chunks: usize,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<UploadedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl UploadResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            document: None,
            error: Some(message.into()),
        }
    }
}

async fn handle_upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(f)) if f.name() == Some("file") => break f,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(UploadResponse::failure("missing multipart field: file")),
                )
                    .into_response();
            }
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(UploadResponse::failure(format!("invalid multipart body: {e}"))),
                )
                    .into_response();
            }
        }
    };

    let filename = match field.file_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(UploadResponse::failure("uploaded file has no filename")),
            )
                .into_response();
        }
    };

    // Browsers often send generic octet-stream; fall back to the extension.
    let declared = field.content_type().map(|m| m.to_string());
    let mime_type = match declared.as_deref() {
        Some(m) if m != "application/octet-stream" => m.to_string(),
        _ => match mime_for_filename(&filename) {
            Some(m) => m.to_string(),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(UploadResponse::failure(format!(
                        "unsupported document format: {filename}"
                    ))),
                )
                    .into_response();
            }
        },
    };

    if !is_supported(&mime_type) {
        return (
            StatusCode::BAD_REQUEST,
            Json(UploadResponse::failure(format!(
                "unsupported document format: {mime_type}"
            ))),
        )
            .into_response();
    }

    let bytes = match field.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(UploadResponse::failure(format!("failed to read upload: {e}"))),
            )
                .into_response();
        }
    };

    info!(filename = %filename, mime = %mime_type, bytes = bytes.len(), "upload received");

    match state.pipeline.ingest(&filename, &mime_type, &bytes).await {
        Ok(report) => Json(UploadResponse {
            success: true,
            document: Some(UploadedDocument {
                document_id: report.document_id,
                filename: report.filename,
                chunks: report.chunks,
            }),
            error: None,
        })
        .into_response(),
        Err(e) => (status_for(&e), Json(UploadResponse::failure(e.to_string()))).into_response(),
    }
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentInfo {
    document_id: String,
    filename: String,
    char_count: i64,
    chunks: i64,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentInfo>,
}

async fn handle_list_documents(State(state): State<AppState>) -> Response {
    match state.pipeline.list_documents().await {
        Ok(docs) => Json(DocumentListResponse {
            documents: docs
                .into_iter()
                .map(|d| DocumentInfo {
                    document_id: d.id,
                    filename: d.filename,
                    char_count: d.char_count,
                    chunks: d.chunk_count,
                    status: d.status.as_str().to_string(),
                    error_message: d.error_message,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => (
            status_for(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ============ DELETE /documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.pipeline.delete_document(&id).await {
        Ok(true) => Json(DeleteResponse {
            success: true,
            error: None,
        })
        .into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(DeleteResponse {
                success: false,
                error: Some(format!("document not found: {id}")),
            }),
        )
            .into_response(),
        Err(e) => (
            status_for(&e),
            Json(DeleteResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index_ready: bool,
    document_count: usize,
    chunk_count: i64,
}

async fn handle_health(State(state): State<AppState>) -> Response {
    let document_count = match state.pipeline.list_documents().await {
        Ok(docs) => docs.len(),
        Err(_) => 0,
    };
    let chunk_count = state.pipeline.chunk_count().await.unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index_ready: state.pipeline.index_size() > 0,
        document_count,
        chunk_count,
    })
    .into_response()
}
