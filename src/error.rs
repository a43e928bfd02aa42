//! Error taxonomy for the retrieval-augmented pipeline.
//!
//! Every fallible stage maps its failures onto [`RagError`] so callers can
//! distinguish retryable upstream hiccups ([`RagError::Transient`]) from
//! permanent ones, and so user-visible messages stay consistent across the
//! CLI and the HTTP surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The declared MIME type is not one of the recognized formats.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The bytes could not be parsed as the declared format, or yielded no text.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// Chunker configuration violates `overlap_chars < max_chars` (or `max_chars == 0`).
    #[error("invalid chunk config: {0}")]
    InvalidChunkConfig(String),

    /// A vector's dimension disagrees with the index's fixed dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Retryable upstream failure: network error, timeout, rate limit, 5xx.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// Non-retryable upstream failure: bad request, auth, malformed response.
    #[error("upstream error: {0}")]
    Fatal(String),

    /// The language model call failed after retry exhaustion.
    #[error("answer generation failed: {0}")]
    GenerationFailed(String),

    /// Persisted index state cannot be trusted; requires a rebuild.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl RagError {
    /// True for failures a bounded-retry policy should attempt again.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(RagError::Transient("429".into()).is_transient());
        assert!(!RagError::Fatal("401".into()).is_transient());
        assert!(!RagError::GenerationFailed("gave up".into()).is_transient());
    }

    #[test]
    fn dimension_mismatch_message_names_both_dims() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("384") && msg.contains("768"));
    }
}
