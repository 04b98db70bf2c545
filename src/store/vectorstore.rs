//! Vector store abstraction layer.
//!
//! One capability set implemented by every backend, so the router can hold
//! whichever implementation is currently active behind a single contract:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        VectorStore Trait                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ ensure_namespace │ upsert │ search │ delete_* │ stats           │
//! └─────────────────────────────────────────────────────────────────┘
//!         ▲                    ▲                    ▲
//!         │                    │                    │
//!   ┌─────┴──────┐     ┌──────┴───────┐     ┌──────┴──────┐
//!   │   Qdrant   │     │  Relational  │     │  In-memory  │
//!   │ (primary)  │     │  (fallback)  │     │   (tests)   │
//!   └────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! Namespaces partition everything by owner (chatbot id): no search,
//! upsert, or delete ever crosses owners.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{Chunk, NamespaceStats, Result, SearchMatch};

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Capability set shared by all chunk storage backends.
///
/// Implementations must be safe to call from many concurrent requests.
/// Operations against namespaces that were never created are benign:
/// searches return no matches, deletes succeed, stats report zeros.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Make the owner's namespace ready for upserts. Idempotent.
    async fn ensure_namespace(&self, owner: &str) -> Result<()>;

    /// Insert or replace chunks by id. Returns the number of chunks
    /// written.
    async fn upsert(&self, owner: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Rank the owner's chunks by cosine similarity against
    /// `query_vector`, drop scores below `score_threshold`, and return at
    /// most `limit` matches in descending score order. Ties resolve by
    /// original insertion order (earlier chunk wins).
    async fn search(
        &self,
        owner: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchMatch>>;

    /// Remove every chunk of one document. Idempotent.
    async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()>;

    /// Remove the owner's entire namespace. Idempotent.
    async fn delete_namespace(&self, owner: &str) -> Result<()>;

    /// Count the owner's documents and chunks.
    async fn stats(&self, owner: &str) -> Result<NamespaceStats>;
}

/// Cosine similarity between two vectors; 0.0 for mismatched lengths or
/// zero-norm inputs.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank `candidates` (insertion-ordered `(chunk, score)` pairs) into the
/// final match list: threshold filter, stable descending sort, truncate.
pub(crate) fn rank_matches(
    candidates: Vec<(Chunk, f32)>,
    limit: usize,
    score_threshold: f32,
) -> Vec<SearchMatch> {
    let mut scored: Vec<(Chunk, f32)> = candidates
        .into_iter()
        .filter(|(_, score)| *score >= score_threshold)
        .collect();

    // Stable sort keeps insertion order among equal scores.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(chunk, score)| SearchMatch {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            text: chunk.text,
            score,
            metadata: chunk.metadata,
        })
        .collect()
}

// ============================================================================
// In-Memory Vector Store (tests and embedded use)
// ============================================================================

/// In-memory vector store.
///
/// Data is lost when the process exits; chunks are kept in insertion order
/// so ranking tie-breaks behave exactly like the persistent backends.
#[derive(Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn ensure_namespace(&self, owner: &str) -> Result<()> {
        self.namespaces
            .write()
            .entry(owner.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, owner: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut namespaces = self.namespaces.write();
        let rows = namespaces.entry(owner.to_string()).or_default();

        for chunk in chunks {
            // Replacement keeps the original slot so insertion order (and
            // with it the tie-break guarantee) is preserved.
            match rows.iter_mut().find(|row| row.id == chunk.id) {
                Some(row) => *row = chunk.clone(),
                None => rows.push(chunk.clone()),
            }
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
        let namespaces = self.namespaces.read();
        let Some(rows) = namespaces.get(owner) else {
            return Ok(Vec::new());
        };

        let candidates: Vec<(Chunk, f32)> = rows
            .iter()
            .map(|chunk| {
                let score = cosine_similarity(query_vector, &chunk.vector);
                (chunk.clone(), score)
            })
            .collect();

        Ok(rank_matches(candidates, limit, score_threshold))
    }

    async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write();
        if let Some(rows) = namespaces.get_mut(owner) {
            rows.retain(|chunk| chunk.document_id != document_id);
        }
        Ok(())
    }

    async fn delete_namespace(&self, owner: &str) -> Result<()> {
        self.namespaces.write().remove(owner);
        Ok(())
    }

    async fn stats(&self, owner: &str) -> Result<NamespaceStats> {
        let namespaces = self.namespaces.read();
        let Some(rows) = namespaces.get(owner) else {
            return Ok(NamespaceStats {
                document_count: 0,
                chunk_count: 0,
            });
        };

        let mut documents: Vec<&str> = rows.iter().map(|c| c.document_id.as_str()).collect();
        documents.sort_unstable();
        documents.dedup();

        Ok(NamespaceStats {
            document_count: documents.len(),
            chunk_count: rows.len(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn test_chunk(id: &str, document_id: &str, text: &str, vector: Vec<f32>) -> Chunk {
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

    #[tokio::test]
    async fn upsert_and_search() {
        let store = InMemoryStore::new();
        store.ensure_namespace("bot").await.unwrap();

        store
            .upsert(
                "bot",
                &[
                    test_chunk("c1", "doc1", "hello world", vec![1.0, 0.0, 0.0]),
                    test_chunk("c2", "doc1", "goodbye world", vec![0.0, 1.0, 0.0]),
                    test_chunk("c3", "doc2", "hello again", vec![0.9, 0.1, 0.0]),
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
        assert_eq!(matches[1].chunk_id, "c3");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn ties_resolve_by_insertion_order() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "bot",
                &[
                    test_chunk("first", "doc1", "a", vec![1.0, 0.0]),
                    test_chunk("second", "doc1", "b", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(matches[0].chunk_id, "first");
        assert_eq!(matches[1].chunk_id, "second");
    }

    #[tokio::test]
    async fn replace_by_id_keeps_count_and_order() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "bot",
                &[
                    test_chunk("c1", "doc1", "old", vec![1.0, 0.0]),
                    test_chunk("c2", "doc1", "other", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert("bot", &[test_chunk("c1", "doc1", "new", vec![1.0, 0.0])])
            .await
            .unwrap();

        let stats = store.stats("bot").await.unwrap();
        assert_eq!(stats.chunk_count, 2);

        let matches = store.search("bot", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(matches[0].chunk_id, "c1");
        assert_eq!(matches[0].text, "new");
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let store = InMemoryStore::new();
        store
            .upsert("bot-a", &[test_chunk("c1", "doc1", "secret", vec![1.0])])
            .await
            .unwrap();

        let matches = store.search("bot-b", &[1.0], 10, 0.0).await.unwrap();
        assert!(matches.is_empty());

        store.delete_namespace("bot-b").await.unwrap();
        let stats = store.stats("bot-a").await.unwrap();
        assert_eq!(stats.chunk_count, 1);
    }

    #[tokio::test]
    async fn delete_document_removes_only_that_document() {
        let store = InMemoryStore::new();
        store
            .upsert(
                "bot",
                &[
                    test_chunk("c1", "doc1", "keep", vec![1.0, 0.0]),
                    test_chunk("c2", "doc2", "drop", vec![1.0, 0.0]),
                    test_chunk("c3", "doc2", "drop too", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        store.delete_document("bot", "doc2").await.unwrap();

        let stats = store.stats("bot").await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);

        // Idempotent: deleting again is not an error.
        store.delete_document("bot", "doc2").await.unwrap();
    }

    #[tokio::test]
    async fn missing_namespace_is_benign() {
        let store = InMemoryStore::new();
        assert!(store
            .search("ghost", &[1.0], 5, 0.0)
            .await
            .unwrap()
            .is_empty());
        store.delete_document("ghost", "doc").await.unwrap();
        store.delete_namespace("ghost").await.unwrap();
        let stats = store.stats("ghost").await.unwrap();
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.document_count, 0);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Length mismatch and zero vectors score 0.
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_matches_applies_threshold_and_limit() {
        let candidates = vec![
            (test_chunk("a", "d", "a", vec![]), 0.9),
            (test_chunk("b", "d", "b", vec![]), 0.4),
            (test_chunk("c", "d", "c", vec![]), 0.7),
            (test_chunk("d", "d", "d", vec![]), 0.8),
        ];
        let matches = rank_matches(candidates, 2, 0.5);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, "a");
        assert_eq!(matches[1].chunk_id, "d");
    }
}
