//! Query-time retrieval: index search, filtering, and truncation to k.
//!
//! Scoring is the raw cosine similarity from the index; filtering only
//! removes candidates, so a strictly higher-similarity result can never
//! rank below a lower one.

use std::collections::HashSet;

use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Tuning for one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Maximum results to return.
    pub k: usize,
    /// Drop candidates scoring below this threshold.
    pub min_score: f32,
}

/// Search the index for the `k` best chunks for `query_vec`.
///
/// When a document filter is present the index is over-fetched (k × 3)
/// before post-filtering, so filtered-out candidates do not starve the
/// result set. An empty index or nothing passing the filters yields an
/// empty vec, not an error.
pub fn retrieve(
    index: &VectorIndex,
    query_vec: &[f32],
    params: &RetrievalParams,
    document_filter: Option<&HashSet<String>>,
) -> Result<Vec<RetrievalResult>, RagError> {
    let fetch_k = if document_filter.is_some() {
        params.k.saturating_mul(3)
    } else {
        params.k
    };

    let hits = index.search(query_vec, fetch_k)?;

    let mut results: Vec<RetrievalResult> = Vec::new();
    for (entry, score) in hits {
        if score < params.min_score {
            continue;
        }
        if let Some(allowed) = document_filter {
            if !allowed.contains(&entry.document_id) {
                continue;
            }
        }
        results.push(RetrievalResult {
            chunk_id: entry.chunk_id,
            document_id: entry.document_id,
            filename: entry.filename,
            chunk_index: entry.chunk_index,
            text: entry.text,
            score,
        });
        if results.len() >= params.k {
            break;
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;

    fn index_with(entries: Vec<(&str, &str, Vec<f32>)>) -> VectorIndex {
        let index = VectorIndex::new(2);
        for (i, (chunk_id, doc_id, vector)) in entries.into_iter().enumerate() {
            index
                .insert(IndexEntry {
                    chunk_id: chunk_id.to_string(),
                    document_id: doc_id.to_string(),
                    filename: format!("{}.txt", doc_id),
                    chunk_index: i as i64,
                    text: format!("chunk {}", chunk_id),
                    vector,
                })
                .unwrap();
        }
        index
    }

    fn params(k: usize) -> RetrievalParams {
        RetrievalParams { k, min_score: 0.0 }
    }

    #[test]
    fn empty_index_returns_empty() {
        let index = VectorIndex::new(2);
        let results = retrieve(&index, &[1.0, 0.0], &params(4), None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn results_are_ordered_by_descending_score() {
        let index = index_with(vec![
            ("far", "d1", vec![0.0, 1.0]),
            ("near", "d2", vec![1.0, 0.1]),
            ("exact", "d3", vec![1.0, 0.0]),
        ]);
        let results = retrieve(&index, &[1.0, 0.0], &params(3), None).unwrap();
        assert_eq!(results[0].chunk_id, "exact");
        assert_eq!(results[1].chunk_id, "near");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn min_score_drops_weak_candidates() {
        let index = index_with(vec![
            ("good", "d1", vec![1.0, 0.0]),
            ("opposite", "d2", vec![-1.0, 0.0]),
        ]);
        let p = RetrievalParams { k: 5, min_score: 0.0 };
        let results = retrieve(&index, &[1.0, 0.0], &p, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "good");
    }

    #[test]
    fn document_filter_restricts_results() {
        let index = index_with(vec![
            ("c1", "d1", vec![1.0, 0.0]),
            ("c2", "d2", vec![1.0, 0.05]),
            ("c3", "d1", vec![0.9, 0.1]),
        ]);
        let allowed: HashSet<String> = ["d1".to_string()].into_iter().collect();
        let results = retrieve(&index, &[1.0, 0.0], &params(2), Some(&allowed)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.document_id == "d1"));
    }

    #[test]
    fn huge_k_returns_everything_without_panicking() {
        let index = index_with(vec![
            ("c1", "d1", vec![1.0, 0.0]),
            ("c2", "d2", vec![0.9, 0.1]),
        ]);
        let p = RetrievalParams { k: usize::MAX, min_score: 0.0 };

        let results = retrieve(&index, &[1.0, 0.0], &p, None).unwrap();
        assert_eq!(results.len(), 2);

        // The over-fetch multiplier must not overflow either.
        let allowed: HashSet<String> = ["d1".to_string()].into_iter().collect();
        let results = retrieve(&index, &[1.0, 0.0], &p, Some(&allowed)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "d1");
    }

    #[test]
    fn truncates_to_k() {
        let index = index_with(vec![
            ("c1", "d1", vec![1.0, 0.0]),
            ("c2", "d2", vec![0.9, 0.1]),
            ("c3", "d3", vec![0.8, 0.2]),
        ]);
        let results = retrieve(&index, &[1.0, 0.0], &params(2), None).unwrap();
        assert_eq!(results.len(), 2);
    }
}
