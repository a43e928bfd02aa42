//! Core data models flowing through the ingestion and query pipeline.

use serde::Serialize;

/// Lifecycle state of an uploaded document.
///
/// Transitions: `Processing → Ready` when every chunk is durably indexed,
/// `Processing → Error` on any stage failure. Both are terminal; only
/// `Ready` documents are visible to queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Processing,
    Ready,
    Error,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Processing => "processing",
            DocStatus::Ready => "ready",
            DocStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocStatus::Processing),
            "ready" => Some(DocStatus::Ready),
            "error" => Some(DocStatus::Error),
            _ => None,
        }
    }
}

/// An uploaded document's metadata record.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub status: DocStatus,
    pub char_count: i64,
    pub chunk_count: i64,
    pub created_at: i64,
    pub error_message: Option<String>,
}

/// A bounded, overlapping segment of a document's extracted text.
///
/// Immutable once created. `chunk_index` is dense within a document
/// (0, 1, 2, ...); `char_start`/`char_end` are char offsets into the
/// extracted text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub char_start: i64,
    pub char_end: i64,
    pub hash: String,
}

/// A scored chunk returned from retrieval, ordered descending by score.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

/// A reference from a generated answer back to a grounding chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub filename: String,
    #[serde(rename = "chunk")]
    pub chunk_index: i64,
    pub score: f32,
}

/// Generated answer plus the citations for every chunk that grounded it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}
