//! HTTP surface for document ingestion and store inspection.
//!
//! The conversation side (utterances, transcript) is library API on
//! [`crate::session::Session`]; this server only exposes the knowledge
//! store, matching the deployment where a voice client uploads course
//! material and polls store state.
//!
//! # Endpoints
//!
//! | Method   | Path              | Description                               |
//! |----------|-------------------|-------------------------------------------|
//! | `POST`   | `/documents`      | Upload one document (base64 payload)      |
//! | `GET`    | `/documents`      | List ingested documents                   |
//! | `DELETE` | `/documents/{id}` | Remove a document's bytes and records     |
//! | `GET`    | `/store/status`   | Knowledge store status query              |
//! | `POST`   | `/store/clear`    | Drop all documents and records            |
//! | `GET`    | `/health`         | Health check (returns version)            |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "kind": "unsupported_format", "message": "..." } }
//! ```
//!
//! Kinds follow [`crate::error::Error::kind`]: `unsupported_format` (415),
//! `ingestion_failed` (400), `document_not_found` (404),
//! `embedding_unavailable` (502), everything else 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the uploading client is
//! a browser surface on another origin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::Error;
use crate::ingest;
use crate::models::{DocumentSummary, IngestReport, StoreStatusReport};
use crate::store::{persist, KnowledgeStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
}

/// Start the HTTP server on `[server].bind` and run until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = Arc::new(KnowledgeStore::open(pool).await?);
    let embedder = create_embedder(&config.embedding)?;

    // Load whatever a previous run persisted; serving can start regardless.
    if let Err(err) = store.ensure_fresh().await {
        warn!(error = %err, "initial store load failed, starting unloaded");
    }

    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        embedder,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/documents", post(handle_upload).get(handle_list_documents))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/store/status", get(handle_store_status))
        .route("/store/clear", post(handle_clear))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = %bind_addr, "server listening");
    println!("lectern server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    kind: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::IngestionFailed(_) => StatusCode::BAD_REQUEST,
            Error::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Error::EmbeddingUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        kind: "ingestion_failed".to_string(),
        message: message.into(),
    }
}

// ============ POST /documents ============

/// JSON request body for `POST /documents`.
#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    media_type: String,
    data_base64: String,
}

/// Upload one document through the full ingestion pipeline. On success the
/// new content is already searchable; the response carries the version id
/// that now serves it.
async fn handle_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let bytes = STANDARD
        .decode(&request.data_base64)
        .map_err(|e| bad_request(format!("data_base64 is not valid base64: {}", e)))?;

    let report = ingest::ingest_document(
        &state.config,
        &state.store,
        state.embedder.as_ref(),
        &request.filename,
        &request.media_type,
        &bytes,
    )
    .await?;
    Ok(Json(report))
}

// ============ GET /store/status ============

async fn handle_store_status(State(state): State<AppState>) -> Json<StoreStatusReport> {
    Json(state.store.status().await)
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = persist::list_documents(state.store.pool())
        .await?
        .into_iter()
        .map(|doc| DocumentSummary {
            id: doc.id,
            filename: doc.filename,
            ingested_at: doc.ingested_at,
            byte_len: doc.byte_len,
            status: doc.status,
        })
        .collect();
    Ok(Json(DocumentListResponse { documents }))
}

// ============ DELETE /documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
    id: String,
}

/// Remove a document's raw bytes and records. The generation bump makes
/// every live session reload on its next store access.
async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let document = persist::get_document(state.store.pool(), &id)
        .await?
        .ok_or_else(|| AppError::from(Error::DocumentNotFound(id.clone())))?;

    persist::delete_document(state.store.pool(), &id).await?;
    let _ = std::fs::remove_file(state.config.documents.dir.join(&document.filename));

    info!(document_id = %id, filename = %document.filename, "document deleted");
    Ok(Json(DeleteResponse { deleted: true, id }))
}

// ============ POST /store/clear ============

/// Drop every document and record, returning the status of the now-empty
/// store.
async fn handle_clear(State(state): State<AppState>) -> Result<Json<StoreStatusReport>, AppError> {
    persist::clear(state.store.pool()).await?;
    let _ = std::fs::remove_dir_all(&state.config.documents.dir);

    info!("store cleared");
    Ok(Json(state.store.status().await))
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
