//! SQLite persistence for documents, chunks, and chunk vectors.
//!
//! The store is the durable side of the index: a document's chunks and
//! vectors are committed in the same transaction that flips its status to
//! `ready`, so after a crash the database never shows a partially indexed
//! document. WAL journaling keeps readers unblocked during writes.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::RagError;
use crate::index::IndexEntry;
use crate::models::{Chunk, DocStatus, Document};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, RagError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::Fatal(format!("cannot create data directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(RagError::Store)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), RagError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                status TEXT NOT NULL,
                char_count INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                hash TEXT NOT NULL,
                UNIQUE(document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_document_id ON chunk_vectors(document_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a new document record in `processing` state.
    pub async fn insert_document(&self, doc: &Document) -> Result<(), RagError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, mime_type, status, char_count, chunk_count, created_at, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.mime_type)
        .bind(doc.status.as_str())
        .bind(doc.char_count)
        .bind(doc.chunk_count)
        .bind(doc.created_at)
        .bind(&doc.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Commit a document's chunks and vectors and flip it `ready`, all in
    /// one transaction. Any prior partial rows for the document are
    /// replaced, so retries cannot leave duplicates.
    pub async fn finalize_document(
        &self,
        document_id: &str,
        char_count: i64,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, char_start, char_end, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.char_start)
            .bind(chunk.char_end)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(document_id)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE documents SET status = ?, char_count = ?, chunk_count = ?, error_message = NULL WHERE id = ?",
        )
        .bind(DocStatus::Ready.as_str())
        .bind(char_count)
        .bind(chunks.len() as i64)
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark a document failed and roll back any partial chunks or vectors,
    /// so the store never holds orphaned fragments of a failed ingestion.
    pub async fn mark_document_error(&self, document_id: &str, message: &str) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE documents SET status = ?, chunk_count = 0, error_message = ? WHERE id = ?",
        )
        .bind(DocStatus::Error.as_str())
        .bind(message)
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a document and cascade to its chunks and vectors.
    /// Returns false when no such document exists.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, RagError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>, RagError> {
        let row = sqlx::query(
            "SELECT id, filename, mime_type, status, char_count, chunk_count, created_at, error_message FROM documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_document(&r)))
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, RagError> {
        let rows = sqlx::query(
            "SELECT id, filename, mime_type, status, char_count, chunk_count, created_at, error_message FROM documents ORDER BY created_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Load all index entries for `ready` documents, in chunk order.
    /// Decoding failures and dimension disagreement surface as
    /// [`RagError::IndexCorruption`]; callers must not serve queries past
    /// them.
    pub async fn load_index_entries(&self) -> Result<Vec<IndexEntry>, RagError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.chunk_index, c.text,
                   d.filename, v.embedding
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN chunk_vectors v ON v.chunk_id = c.id
            WHERE d.status = 'ready'
            ORDER BY d.created_at ASC, c.document_id ASC, c.chunk_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            entries.push(IndexEntry {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                filename: row.get("filename"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                vector: blob_to_vec(&blob)?,
            });
        }
        Ok(entries)
    }

    /// Total chunks across `ready` documents.
    pub async fn chunk_count(&self) -> Result<i64, RagError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON d.id = c.document_id WHERE d.status = 'ready'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp(dir: &tempfile::TempDir) -> Store {
        Store::open(&dir.path().join("store.db")).await.unwrap()
    }

    fn document(id: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            mime_type: "text/plain".to_string(),
            status: DocStatus::Processing,
            char_count: 0,
            chunk_count: 0,
            created_at: 1,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn unknown_status_string_reads_back_as_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = open_temp(&dir).await;
        store.insert_document(&document("d1")).await.unwrap();

        // Simulate a row written by a different (or future) version.
        sqlx::query("UPDATE documents SET status = 'archived' WHERE id = 'd1'")
            .execute(&store.pool)
            .await
            .unwrap();

        let doc = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocStatus::Error);
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status: String = row.get("status");
    let id: String = row.get("id");
    // An unrecognized status means the row was written by something else
    // entirely; treat the document as failed rather than serving it.
    let status = DocStatus::parse(&status).unwrap_or_else(|| {
        warn!(document_id = %id, status = %status, "unknown document status in store");
        DocStatus::Error
    });
    Document {
        id,
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        status,
        char_count: row.get("char_count"),
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
        error_message: row.get("error_message"),
    }
}
