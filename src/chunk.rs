//! Overlapping, sentence-aware text chunker.
//!
//! Splits extracted document text into bounded-size segments that share
//! `overlap_chars` characters of context across boundaries, so retrieval
//! does not lose meaning at a cut. Windows prefer to end on a sentence
//! boundary (`". "`, `"! "`, `"? "`, `"\n"`) past the window midpoint,
//! falling back to a hard cut at `max_chars`.
//!
//! Chunks are exact slices of the input: concatenating them while
//! discounting overlaps reconstructs the original text, and the recorded
//! char offsets always point back into it. Splitting is pure and
//! deterministic, which makes re-ingestion idempotent.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::RagError;
use crate::models::Chunk;

/// A split segment with its char-offset span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Split `text` into overlapping spans of at most `max_chars` chars.
///
/// Empty input yields an empty vec. Fails with
/// [`RagError::InvalidChunkConfig`] when `max_chars == 0` or
/// `overlap_chars >= max_chars`.
pub fn split(text: &str, max_chars: usize, overlap_chars: usize) -> Result<Vec<ChunkSpan>, RagError> {
    if max_chars == 0 {
        return Err(RagError::InvalidChunkConfig(
            "max_chars must be > 0".to_string(),
        ));
    }
    if overlap_chars >= max_chars {
        return Err(RagError::InvalidChunkConfig(format!(
            "overlap_chars ({}) must be < max_chars ({})",
            overlap_chars, max_chars
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of each char, plus a sentinel for the end of the text,
    // so spans can be sliced without landing inside a UTF-8 sequence.
    let mut byte_at: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    byte_at.push(text.len());
    let total = byte_at.len() - 1;

    let slice = |cs: usize, ce: usize| -> &str { &text[byte_at[cs]..byte_at[ce]] };

    if total <= max_chars {
        return Ok(vec![ChunkSpan {
            text: text.to_string(),
            char_start: 0,
            char_end: total,
        }]);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + max_chars).min(total);

        let end = if window_end < total {
            match sentence_cut(&chars[start..window_end], max_chars) {
                Some(cut) => start + cut,
                None => window_end,
            }
        } else {
            window_end
        };

        spans.push(ChunkSpan {
            text: slice(start, end).to_string(),
            char_start: start,
            char_end: end,
        });

        if end >= total {
            break;
        }

        // Forward-progress guard: a sentence cut combined with a large
        // overlap could otherwise move the window backwards.
        let next = end.saturating_sub(overlap_chars);
        start = if next > start { next } else { start + 1 };
    }

    Ok(spans)
}

/// Rightmost sentence boundary in the window, if it falls past the midpoint.
/// Returns the number of chars to keep (boundary char included).
fn sentence_cut(window: &[char], max_chars: usize) -> Option<usize> {
    let half = max_chars / 2;
    for i in (0..window.len()).rev() {
        let keep = i + 1;
        if keep <= half {
            return None;
        }
        let c = window[i];
        if c == '\n' {
            return Some(keep);
        }
        if (c == '.' || c == '!' || c == '?') && window.get(i + 1) == Some(&' ') {
            return Some(keep);
        }
    }
    None
}

/// Split a document's text and wrap the spans as [`Chunk`] records with
/// dense indices, fresh UUIDs, and a SHA-256 text hash.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<Chunk>, RagError> {
    let spans = split(text, max_chars, overlap_chars)?;
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(i, span)| {
            let mut hasher = Sha256::new();
            hasher.update(span.text.as_bytes());
            let hash = format!("{:x}", hasher.finalize());
            Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: i as i64,
                text: span.text,
                char_start: span.char_start as i64,
                char_end: span.char_end as i64,
                hash,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let spans = split("Hello, world!", 100, 10).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Hello, world!");
        assert_eq!((spans[0].char_start, spans[0].char_end), (0, 13));
    }

    #[test]
    fn overlap_must_be_smaller_than_max() {
        let err = split("abc", 10, 10).unwrap_err();
        assert!(matches!(err, RagError::InvalidChunkConfig(_)));
        let err = split("abc", 0, 0).unwrap_err();
        assert!(matches!(err, RagError::InvalidChunkConfig(_)));
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "First sentence. Second sentence. Third sentence. ".repeat(20);
        let a = split(&text, 120, 30).unwrap();
        let b = split(&text, 120, 30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        // No sentence boundaries: hard cuts at max_chars.
        let text: String = "abcdefghij".repeat(90); // 900 chars
        let spans = split(&text, 400, 50).unwrap();
        assert_eq!(spans.len(), 3);
        for pair in spans.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            let tail: String = prev[prev.len() - 50..].iter().collect();
            let head: String = next[..50].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn three_paragraph_document_chunks_as_expected() {
        // 900 chars: three paragraphs of 300/300/298 chars joined by newlines.
        let text = format!("{}\n{}\n{}", "a".repeat(300), "b".repeat(300), "c".repeat(298));
        assert_eq!(text.chars().count(), 900);
        let spans = split(&text, 400, 50).unwrap();
        assert_eq!(spans.len(), 3);
        // Paragraph boundaries win over hard cuts.
        assert!(spans[0].text.ends_with('\n'));
        let first: Vec<char> = spans[0].text.chars().collect();
        let second: Vec<char> = spans[1].text.chars().collect();
        let tail: String = first[first.len() - 50..].iter().collect();
        let head: String = second[..50].iter().collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn coverage_reconstructs_original_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let overlap = 25;
        let spans = split(&text, 200, overlap).unwrap();

        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for span in &spans {
            assert!(span.char_start <= covered, "gap before chunk");
            let chars: Vec<char> = span.text.chars().collect();
            let skip = covered - span.char_start;
            rebuilt.extend(&chars[skip..]);
            covered = span.char_end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld. ".repeat(50);
        let spans = split(&text, 60, 15).unwrap();
        assert!(spans.len() > 1);
        for span in &spans {
            assert!(span.text.chars().count() <= 60);
        }
    }

    #[test]
    fn chunk_indices_are_dense() {
        let text = "Sentence one. Sentence two. Sentence three. ".repeat(30);
        let chunks = chunk_document("doc1", &text, 150, 40).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.document_id, "doc1");
            assert_eq!(c.hash.len(), 64);
        }
    }
}
