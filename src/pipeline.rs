//! Pipeline orchestration: the ingest and query flows.
//!
//! Ingestion drives extract → chunk → embed → durable commit → index
//! publish, with the document's status tracking progress
//! (`processing → ready` or `processing → error`). A failed ingestion
//! rolls back every partial artifact, so the index never holds orphaned
//! fragments and a document is never partially visible to queries.
//!
//! Querying is a pure read path: embed the query, search the index, rank,
//! and generate a cited answer. It never mutates document or chunk state.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::RagError;
use crate::extract::extract_text;
use crate::generate::{create_chat_model, AnswerGenerator, ChatModel};
use crate::index::{IndexEntry, VectorIndex};
use crate::models::{Answer, DocStatus, Document};
use crate::retrieve::{retrieve, RetrievalParams};
use crate::store::Store;

/// Chunking and retrieval knobs, separated from the full [`Config`] so
/// tests can construct a pipeline without touching server or provider
/// sections.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub k: usize,
    pub min_score: f32,
    pub max_context_chars: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chars: config.chunking.max_chars,
            overlap_chars: config.chunking.overlap_chars,
            k: config.retrieval.k,
            min_score: config.retrieval.min_score,
            max_context_chars: config.retrieval.max_context_chars,
        }
    }
}

/// Summary of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub chunks: usize,
    pub char_count: usize,
}

/// Outcome of a query, distinguishing the structured non-answer cases.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The generator produced a grounded answer.
    Answered(Answer),
    /// The index holds no documents; the generator was not called.
    NoDocuments,
    /// Retrieval found nothing relevant; the generator was not called.
    NothingRelevant,
}

pub struct Pipeline {
    store: Store,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: AnswerGenerator,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Store,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        options: PipelineOptions,
    ) -> Self {
        let generator = AnswerGenerator::new(chat, options.max_context_chars);
        Self {
            store,
            index,
            embedder,
            generator,
            options,
        }
    }

    /// Open the store, rebuild the in-memory index from persisted state,
    /// and wire up the configured providers.
    ///
    /// Fails with [`RagError::IndexCorruption`] when the persisted vectors
    /// cannot be trusted (malformed rows, or a dimension that disagrees
    /// with the configured embedding model); serving queries against such
    /// a store would silently return wrong results.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.llm)?;

        let store = Store::open(&config.db.path).await?;
        let dims = config.embedding.dims.unwrap_or(0);
        let entries = store.load_index_entries().await?;
        let entry_count = entries.len();
        let index = Arc::new(VectorIndex::load(dims, entries)?);
        info!(entries = entry_count, dims, "vector index loaded");

        Ok(Self::new(
            store,
            index,
            embedder,
            chat,
            PipelineOptions::from_config(config),
        ))
    }

    /// Ingest one uploaded file. On any stage failure the document is
    /// marked `error` with a human-readable message and every partial
    /// artifact is rolled back; other in-flight ingestions are unaffected.
    pub async fn ingest(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<IngestReport, RagError> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            status: DocStatus::Processing,
            char_count: 0,
            chunk_count: 0,
            created_at: chrono::Utc::now().timestamp(),
            error_message: None,
        };
        self.store.insert_document(&document).await?;

        match self.ingest_stages(&document.id, filename, mime_type, bytes).await {
            Ok(report) => {
                info!(
                    document_id = %report.document_id,
                    filename = %report.filename,
                    chunks = report.chunks,
                    chars = report.char_count,
                    "document ingested"
                );
                Ok(report)
            }
            Err(e) => {
                error!(document_id = %document.id, filename, error = %e, "ingestion failed");
                self.index.remove(&document.id);
                self.store
                    .mark_document_error(&document.id, &e.to_string())
                    .await?;
                Err(e)
            }
        }
    }

    async fn ingest_stages(
        &self,
        document_id: &str,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<IngestReport, RagError> {
        let text = extract_text(bytes, mime_type)?;
        let char_count = text.chars().count();

        let chunks = chunk_document(
            document_id,
            &text,
            self.options.max_chars,
            self.options.overlap_chars,
        )?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Fatal(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        // Durable first, then visible: commit to the store and only then
        // publish entries to the in-memory index.
        self.store
            .finalize_document(
                document_id,
                char_count as i64,
                &chunks,
                &vectors,
                self.embedder.model_name(),
            )
            .await?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors.iter())
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                filename: filename.to_string(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                vector: vector.clone(),
            })
            .collect();
        self.index.insert_all(entries)?;

        Ok(IngestReport {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            chunks: chunks.len(),
            char_count,
        })
    }

    /// Answer a question from the indexed documents.
    pub async fn query(
        &self,
        question: &str,
        k: Option<usize>,
        document_filter: Option<&HashSet<String>>,
    ) -> Result<QueryOutcome, RagError> {
        if self.index.size() == 0 {
            return Ok(QueryOutcome::NoDocuments);
        }

        let query_vec = self
            .embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Fatal("empty embedding response".to_string()))?;

        // A request cannot usefully ask for more chunks than the index
        // holds; clamping also keeps absurd values from reaching the
        // retrieval arithmetic.
        let params = RetrievalParams {
            k: k.unwrap_or(self.options.k).clamp(1, self.index.size()),
            min_score: self.options.min_score,
        };
        let results = retrieve(&self.index, &query_vec, &params, document_filter)?;

        if results.is_empty() {
            return Ok(QueryOutcome::NothingRelevant);
        }

        let answer = self.generator.generate(question, &results).await?;
        Ok(QueryOutcome::Answered(answer))
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, RagError> {
        self.store.list_documents().await
    }

    /// Remove a document and cascade to its chunks and index entries.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, RagError> {
        let existed = self.store.delete_document(document_id).await?;
        let removed = self.index.remove(document_id);
        if existed {
            info!(document_id, entries_removed = removed, "document deleted");
        }
        Ok(existed)
    }

    pub async fn document(&self, document_id: &str) -> Result<Option<Document>, RagError> {
        self.store.get_document(document_id).await
    }

    pub fn index_size(&self) -> usize {
        self.index.size()
    }

    pub async fn chunk_count(&self) -> Result<i64, RagError> {
        self.store.chunk_count().await
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
    }
}
