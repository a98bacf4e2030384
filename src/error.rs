//! Error taxonomy shared across the knowledge and transcript paths.

use thiserror::Error;

/// Main error type for lectern operations.
///
/// Ingestion-path variants propagate to the ingestion caller. Retrieval-path
/// failures are wrapped in [`Error::RetrievalDegraded`] and logged at the
/// injector boundary, never surfaced to the conversation. A
/// [`Error::DuplicateFinalEvent`] is only ever constructed for diagnostics;
/// the aggregator records and drops it rather than returning it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported media type: {0} (only application/pdf is accepted)")]
    UnsupportedFormat(String),

    #[error("ingestion failed: {0}")]
    IngestionFailed(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("index build failed: {0}")]
    IndexBuildFailed(String),

    #[error("reload failed, serving stale version: {0}")]
    ReloadFailed(String),

    #[error("retrieval degraded: {0}")]
    RetrievalDegraded(String),

    #[error("duplicate final event for {source_name}/{segment_id}, ignored")]
    DuplicateFinalEvent { source_name: String, segment_id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

impl Error {
    /// Stable machine-readable kind string, used in HTTP error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::IngestionFailed(_) => "ingestion_failed",
            Error::EmbeddingUnavailable(_) => "embedding_unavailable",
            Error::IndexBuildFailed(_) => "index_build_failed",
            Error::ReloadFailed(_) => "reload_failed",
            Error::RetrievalDegraded(_) => "retrieval_degraded",
            Error::DuplicateFinalEvent { .. } => "duplicate_final_event",
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::DocumentNotFound(_) => "document_not_found",
        }
    }
}

/// Result type alias for lectern.
pub type Result<T> = std::result::Result<T, Error>;
