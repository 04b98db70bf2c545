//! Relational fallback store.
//!
//! Persists chunk rows (vector included) in a SQLite/libsql table scoped
//! by owner, and runs similarity search in-process: load the owner's
//! candidate rows, score with cosine similarity, sort, truncate. Slower
//! than a real vector engine but always available, which is exactly what
//! the failover path needs.

use async_trait::async_trait;
use libsql::{Builder, Connection, Database};

use super::vectorstore::{cosine_similarity, rank_matches, VectorStore};
use crate::types::{AppError, Chunk, Metadata, NamespaceStats, Result, SearchMatch};

/// SQLite/libsql-backed vector store.
///
/// One row per chunk; the embedding travels as a JSON array column. Row
/// order (`rowid`) preserves insertion order, which backs the
/// deterministic ranking tie-break.
pub struct RelationalStore {
    db: Database,
}

impl RelationalStore {
    /// Open (or create) the store. `None` uses an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn connect(path: Option<&str>) -> Result<Self> {
        let db = Builder::new_local(path.unwrap_or(":memory:"))
            .build()
            .await
            .map_err(|e| AppError::Backend(format!("Failed to open database: {}", e)))?;

        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| AppError::Backend(format!("Failed to get connection: {}", e)))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, id)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Backend(format!("Failed to create chunks table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document
             ON chunks (namespace, document_id)",
            (),
        )
        .await
        .map_err(|e| AppError::Backend(format!("Failed to create document index: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for RelationalStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_namespace(&self, _owner: &str) -> Result<()> {
        // Namespaces are filtered partitions of one table; the schema is
        // created at connect time.
        Ok(())
    }

    async fn upsert(&self, owner: &str, chunks: &[Chunk]) -> Result<usize> {
        let conn = self.connection()?;

        for chunk in chunks {
            let embedding = serde_json::to_string(&chunk.vector)
                .map_err(|e| AppError::Backend(format!("Failed to encode embedding: {}", e)))?;
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| AppError::Backend(format!("Failed to encode metadata: {}", e)))?;

            // ON CONFLICT keeps the original rowid so a replaced chunk
            // retains its insertion-order position.
            conn.execute(
                "INSERT INTO chunks
                    (namespace, id, document_id, chunk_index, content,
                     embedding, metadata, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (namespace, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    created_at = excluded.created_at",
                (
                    owner,
                    chunk.id.as_str(),
                    chunk.document_id.as_str(),
                    chunk.index as i64,
                    chunk.text.as_str(),
                    embedding,
                    metadata,
                    chunk.created_at,
                ),
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to upsert chunk: {}", e)))?;
        }

        Ok(chunks.len())
    }

    async fn search(
        &self,
        owner: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, document_id, chunk_index, content, embedding,
                        metadata, created_at
                 FROM chunks WHERE namespace = ?
                 ORDER BY rowid ASC",
                [owner],
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to query chunks: {}", e)))?;

        let mut candidates: Vec<(Chunk, f32)> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Backend(e.to_string()))?
        {
            let embedding_json: String =
                row.get(4).map_err(|e| AppError::Backend(e.to_string()))?;
            let vector: Vec<f32> = serde_json::from_str(&embedding_json)
                .map_err(|e| AppError::Backend(format!("Corrupt embedding column: {}", e)))?;
            let metadata_json: String =
                row.get(5).map_err(|e| AppError::Backend(e.to_string()))?;
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .map_err(|e| AppError::Backend(format!("Corrupt metadata column: {}", e)))?;

            let score = cosine_similarity(query_vector, &vector);
            let chunk = Chunk {
                id: row.get(0).map_err(|e| AppError::Backend(e.to_string()))?,
                document_id: row.get(1).map_err(|e| AppError::Backend(e.to_string()))?,
                owner_id: owner.to_string(),
                text: row.get(3).map_err(|e| AppError::Backend(e.to_string()))?,
                vector,
                index: row
                    .get::<i64>(2)
                    .map_err(|e| AppError::Backend(e.to_string()))? as usize,
                metadata,
                created_at: row.get(6).map_err(|e| AppError::Backend(e.to_string()))?,
            };
            candidates.push((chunk, score));
        }

        Ok(rank_matches(candidates, limit, score_threshold))
    }

    async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "DELETE FROM chunks WHERE namespace = ? AND document_id = ?",
            [owner, document_id],
        )
        .await
        .map_err(|e| AppError::Backend(format!("Failed to delete document: {}", e)))?;

        Ok(())
    }

    async fn delete_namespace(&self, owner: &str) -> Result<()> {
        let conn = self.connection()?;

        conn.execute("DELETE FROM chunks WHERE namespace = ?", [owner])
            .await
            .map_err(|e| AppError::Backend(format!("Failed to delete namespace: {}", e)))?;

        Ok(())
    }

    async fn stats(&self, owner: &str) -> Result<NamespaceStats> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT COUNT(DISTINCT document_id), COUNT(*)
                 FROM chunks WHERE namespace = ?",
                [owner],
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to query stats: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| AppError::Backend(e.to_string()))?
            .ok_or_else(|| AppError::Backend("Stats query returned no row".to_string()))?;

        Ok(NamespaceStats {
            document_count: row
                .get::<i64>(0)
                .map_err(|e| AppError::Backend(e.to_string()))? as usize,
            chunk_count: row
                .get::<i64>(1)
                .map_err(|e| AppError::Backend(e.to_string()))? as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, document_id: &str, text: &str, vector: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            owner_id: "bot".to_string(),
            text: text.to_string(),
            vector,
            index: 0,
            metadata: Metadata::new(),
            created_at: 1_700_000_000,
        }
    }

    async fn memory_store() -> RelationalStore {
        RelationalStore::connect(None).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_search_round_trip() {
        let store = memory_store().await;
        store
            .upsert(
                "bot",
                &[
                    chunk("c1", "doc1", "rust is fast", vec![1.0, 0.0, 0.0]),
                    chunk("c2", "doc1", "python is friendly", vec![0.0, 1.0, 0.0]),
                    chunk("c3", "doc2", "rust is safe", vec![0.9, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();

        let matches = store
            .search("bot", &[1.0, 0.0, 0.0], 10, 0.5)
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, "c1");
        assert_eq!(matches[0].text, "rust is fast");
        assert_eq!(matches[1].chunk_id, "c3");
    }

    #[tokio::test]
    async fn threshold_filters_low_scores() {
        let store = memory_store().await;
        store
            .upsert(
                "bot",
                &[
                    chunk("c1", "doc1", "a", vec![1.0, 0.0]),
                    chunk("c2", "doc1", "b", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.9).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn ties_resolve_by_insertion_order() {
        let store = memory_store().await;
        store
            .upsert(
                "bot",
                &[
                    chunk("first", "doc1", "a", vec![1.0, 0.0]),
                    chunk("second", "doc1", "b", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(matches[0].chunk_id, "first");
        assert_eq!(matches[1].chunk_id, "second");
    }

    #[tokio::test]
    async fn replacing_a_chunk_keeps_its_position() {
        let store = memory_store().await;
        store
            .upsert(
                "bot",
                &[
                    chunk("c1", "doc1", "old text", vec![1.0, 0.0]),
                    chunk("c2", "doc1", "other", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert("bot", &[chunk("c1", "doc1", "new text", vec![1.0, 0.0])])
            .await
            .unwrap();

        let stats = store.stats("bot").await.unwrap();
        assert_eq!(stats.chunk_count, 2);

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(matches[0].chunk_id, "c1");
        assert_eq!(matches[0].text, "new text");
    }

    #[tokio::test]
    async fn delete_document_removes_all_its_chunks() {
        let store = memory_store().await;
        store
            .upsert(
                "bot",
                &[
                    chunk("c1", "doc1", "keep", vec![1.0, 0.0]),
                    chunk("c2", "doc2", "drop", vec![1.0, 0.0]),
                    chunk("c3", "doc2", "drop too", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        store.delete_document("bot", "doc2").await.unwrap();

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert!(matches.iter().all(|m| m.document_id != "doc2"));

        let stats = store.stats("bot").await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);

        // Idempotent.
        store.delete_document("bot", "doc2").await.unwrap();
        store.delete_document("bot", "never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = memory_store().await;
        store
            .upsert("bot-a", &[chunk("c1", "doc1", "secret", vec![1.0])])
            .await
            .unwrap();
        store
            .upsert("bot-b", &[chunk("c1", "doc1", "public", vec![1.0])])
            .await
            .unwrap();

        let matches = store.search("bot-b", &[1.0], 10, 0.0).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "public");

        store.delete_namespace("bot-a").await.unwrap();
        assert_eq!(store.stats("bot-a").await.unwrap().chunk_count, 0);
        assert_eq!(store.stats("bot-b").await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn metadata_round_trips_through_rows() {
        let store = memory_store().await;
        let mut with_meta = chunk("c1", "doc1", "text", vec![1.0]);
        with_meta
            .metadata
            .insert("total_chunks".into(), serde_json::json!(3));
        store.upsert("bot", &[with_meta]).await.unwrap();

        let matches = store.search("bot", &[1.0], 10, 0.0).await.unwrap();
        assert_eq!(matches[0].metadata["total_chunks"], 3);
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.db");
        let path = path.to_str().unwrap();

        {
            let store = RelationalStore::connect(Some(path)).await.unwrap();
            store
                .upsert("bot", &[chunk("c1", "doc1", "durable", vec![1.0])])
                .await
                .unwrap();
        }

        let reopened = RelationalStore::connect(Some(path)).await.unwrap();
        let stats = reopened.stats("bot").await.unwrap();
        assert_eq!(stats.chunk_count, 1);
    }
}
