//! In-memory vector index with brute-force cosine search.
//!
//! The index is the single owner of all query-time state: entries carry
//! denormalized citation metadata (filename, chunk index, text) so a
//! search never joins back to the document store. Entries live in a `Vec`
//! behind `std::sync::RwLock`; writers append under a short write lock,
//! readers scan in parallel. Lock scopes never span an await point.
//!
//! Durability is delegated to the SQLite store: entries are only published
//! here after their document's transaction has committed, and
//! [`VectorIndex::load`] rebuilds the same state on restart.

use std::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::RagError;

/// One indexed chunk: its vector plus the metadata needed for citations.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Concurrency-safe nearest-neighbor index over a fixed dimension.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    entries: RwLock<Vec<IndexEntry>>,
}

impl VectorIndex {
    /// Create an empty index with dimension `dims`, fixed for its lifetime.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild an index from persisted entries, verifying every vector
    /// against the fixed dimension. A disagreement means the store was
    /// written by a different embedding model and cannot be trusted.
    pub fn load(dims: usize, entries: Vec<IndexEntry>) -> Result<Self, RagError> {
        for entry in &entries {
            if entry.vector.len() != dims {
                return Err(RagError::IndexCorruption(format!(
                    "chunk {} has dimension {}, index dimension is {}",
                    entry.chunk_id,
                    entry.vector.len(),
                    dims
                )));
            }
        }
        Ok(Self {
            dims,
            entries: RwLock::new(entries),
        })
    }

    /// Add one entry. Fails with [`RagError::DimensionMismatch`] without
    /// modifying the index when the vector's dimension is wrong.
    pub fn insert(&self, entry: IndexEntry) -> Result<(), RagError> {
        if entry.vector.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: entry.vector.len(),
            });
        }
        self.entries.write().unwrap().push(entry);
        Ok(())
    }

    /// Add a document's entries under one write lock, so a search sees
    /// either none or all of them.
    pub fn insert_all(&self, batch: Vec<IndexEntry>) -> Result<(), RagError> {
        for entry in &batch {
            if entry.vector.len() != self.dims {
                return Err(RagError::DimensionMismatch {
                    expected: self.dims,
                    actual: entry.vector.len(),
                });
            }
        }
        self.entries.write().unwrap().extend(batch);
        Ok(())
    }

    /// Up to `k` nearest entries by cosine similarity, best first. Equal
    /// scores keep insertion order (stable sort), so results are
    /// deterministic across identical index states.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(IndexEntry, f32)>, RagError> {
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(IndexEntry, f32)> = entries
            .iter()
            .map(|e| (e.clone(), cosine_similarity(query, &e.vector)))
            .collect();
        drop(entries);

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Remove every entry belonging to `document_id`; returns the count.
    pub fn remove(&self, document_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|e| e.document_id != document_id);
        before - entries.len()
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn dimension(&self) -> usize {
        self.dims
    }
}
