//! Core data models used throughout lectern.
//!
//! These types represent the documents, chunks, and embedding records that
//! flow through the ingestion pipeline, plus the utterance events and
//! transcript lines handled by the conversation side.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> DocumentStatus {
        match s {
            "processed" => DocumentStatus::Processed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }
}

/// Uploaded document as stored in SQLite. Immutable once processed; a
/// re-upload of the same filename addresses the same row and replaces its
/// records wholesale.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub ingested_at: DateTime<Utc>,
    pub byte_len: i64,
    pub status: DocumentStatus,
    pub dedup_hash: String,
}

/// A windowed span of a document's normalized text. Produced by the chunker,
/// consumed by the embedder; persisted only as part of an [`EmbeddingRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    pub seq: i64,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// An embedded chunk as held by the vector index and the backing store.
///
/// Identity for replacement is (document_id, seq); `chunk_id` is a stable
/// derived id carried for display and cross-referencing.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub seq: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// One ranked similarity-search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: EmbeddingRecord,
    pub score: f32,
}

/// Which recognition stream an utterance event came from.
///
/// Identity keys in the aggregator are always (source, segment_id); the same
/// segment_id arriving from both sources is two different utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtteranceSource {
    Local,
    Remote,
}

impl UtteranceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtteranceSource::Local => "local",
            UtteranceSource::Remote => "remote",
        }
    }
}

/// Fixed record shape shared by both utterance event variants.
#[derive(Debug, Clone)]
pub struct UtteranceRecord {
    pub source: UtteranceSource,
    pub participant_id: String,
    pub segment_id: String,
    pub text: String,
    pub emitted_at: DateTime<Utc>,
}

/// A recognizer event, tagged at the ingestion boundary.
///
/// Partial events update an open transcript line in place; a Final event
/// freezes it. Validation (non-empty segment_id) happens where events enter
/// the session, before they reach the aggregator state machine.
#[derive(Debug, Clone)]
pub enum UtteranceEvent {
    Partial(UtteranceRecord),
    Final(UtteranceRecord),
}

impl UtteranceEvent {
    pub fn partial(
        source: UtteranceSource,
        participant_id: impl Into<String>,
        segment_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        UtteranceEvent::Partial(UtteranceRecord {
            source,
            participant_id: participant_id.into(),
            segment_id: segment_id.into(),
            text: text.into(),
            emitted_at: Utc::now(),
        })
    }

    pub fn finalized(
        source: UtteranceSource,
        participant_id: impl Into<String>,
        segment_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        UtteranceEvent::Final(UtteranceRecord {
            source,
            participant_id: participant_id.into(),
            segment_id: segment_id.into(),
            text: text.into(),
            emitted_at: Utc::now(),
        })
    }

    pub fn record(&self) -> &UtteranceRecord {
        match self {
            UtteranceEvent::Partial(r) | UtteranceEvent::Final(r) => r,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, UtteranceEvent::Final(_))
    }
}

/// One line of the merged conversation transcript, as seen by readers of the
/// snapshot surface.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub line_id: String,
    pub speaker_label: String,
    pub text: String,
    pub is_final: bool,
    pub last_updated_at: DateTime<Utc>,
}

/// Result of one successful document ingestion, returned by the ingestion
/// entry point.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub status: DocumentStatus,
    pub document_id: String,
    pub chunk_count: usize,
    pub current_version_id: u64,
}

/// Coarse store condition reported by the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    Ready,
    Empty,
    Unknown,
}

impl StoreState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreState::Ready => "ready",
            StoreState::Empty => "empty",
            StoreState::Unknown => "unknown",
        }
    }
}

/// Knowledge store status, reflecting exactly the current version.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatusReport {
    pub status: StoreState,
    pub document_count: usize,
    pub vector_count: usize,
    pub document_ids: Vec<String>,
}

/// One entry in the document listing surface.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub ingested_at: DateTime<Utc>,
    pub byte_len: i64,
    pub status: DocumentStatus,
}
