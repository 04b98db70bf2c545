//! Document ingestion and retrieval orchestration.
//!
//! [`DocumentProcessor`] wires the chunker, the embedding service, and the
//! backend router into the operations the application layer consumes:
//! ingest (text or file), similarity search, bounded context assembly, and
//! deletion. All validation of caller input happens here, before any
//! backend is touched.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::json;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::rag::chunker::TextChunker;
use crate::rag::embeddings::EmbeddingService;
use crate::store::{HybridRouter, RelationalStore, VectorStore};
use crate::types::{
    AppError, Chunk, IngestReceipt, Metadata, NamespaceStats, Result, SearchMatch,
};

/// Default number of matches returned by [`DocumentProcessor::query`].
pub const DEFAULT_QUERY_LIMIT: usize = 5;
/// Default score threshold for [`DocumentProcessor::query`].
pub const DEFAULT_QUERY_THRESHOLD: f32 = 0.5;
/// Fixed match limit used during context assembly.
const CONTEXT_LIMIT: usize = 5;
/// Fixed score threshold used during context assembly.
const CONTEXT_THRESHOLD: f32 = 0.7;
/// Upper bound on the caller-facing search limit.
const MAX_SEARCH_LIMIT: usize = 10;
/// Lower bound on the caller-facing search threshold.
const MIN_SEARCH_THRESHOLD: f32 = 0.1;
/// Upper bound on the caller-facing context budget, in bytes.
const MAX_CONTEXT_LENGTH: usize = 5000;

/// MIME types accepted by [`DocumentProcessor::ingest_file`].
const SUPPORTED_MIME_TYPES: [&str; 2] = ["text/plain", "application/json"];

/// Orchestrates chunking, embedding, and storage for one deployment.
///
/// The processor is cheap to share (`Arc`) and safe to call from many
/// concurrent requests; per-request state lives on the stack.
pub struct DocumentProcessor {
    chunker: TextChunker,
    embedder: EmbeddingService,
    router: Arc<HybridRouter>,
    embed_concurrency: usize,
}

impl DocumentProcessor {
    /// Assemble a processor from already-built parts.
    pub fn new(
        chunker: TextChunker,
        embedder: EmbeddingService,
        router: Arc<HybridRouter>,
        embed_concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            router,
            embed_concurrency: embed_concurrency.max(1),
        }
    }

    /// Build a processor from configuration: relational fallback store,
    /// optional Qdrant primary, and the embedding provider if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunker parameters are invalid or the
    /// fallback store cannot be opened. An unreachable primary is not an
    /// error; the router simply starts on the fallback.
    pub async fn connect(config: &RetrievalConfig) -> Result<Self> {
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        let embedder = EmbeddingService::new(&config.embedding)?;

        let fallback: Arc<dyn VectorStore> =
            Arc::new(RelationalStore::connect(config.database_path.as_deref()).await?);
        let router = Arc::new(HybridRouter::connect(build_primary(config), fallback).await);

        Ok(Self::new(chunker, embedder, router, config.embed_concurrency))
    }

    /// The backend router, exposed for admin operations such as
    /// [`HybridRouter::reprobe`].
    pub fn router(&self) -> &HybridRouter {
        &self.router
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Ingest raw text under a caller-supplied document id.
    ///
    /// Chunks the normalized text, embeds every chunk with a bounded
    /// fan-out, and commits all chunks in one batch. Nothing is committed
    /// when chunking yields no content.
    ///
    /// # Errors
    ///
    /// `Validation` when the text contains no chunkable content;
    /// backend errors only when both stores fail.
    pub async fn ingest(
        &self,
        owner: &str,
        document_id: &str,
        text: &str,
        metadata: Metadata,
    ) -> Result<IngestReceipt> {
        let started = Instant::now();

        let normalized = normalize_whitespace(text);
        let pieces = self.chunker.chunk(&normalized);
        if pieces.is_empty() {
            return Err(AppError::Validation(
                "document contains no extractable text".to_string(),
            ));
        }

        let total_chunks = pieces.len();
        let total_length = normalized.chars().count();
        let created_at = chrono::Utc::now().timestamp();

        self.router.ensure_namespace(owner).await?;

        // Indexes are assigned before the concurrent fan-out, so storage
        // order never depends on embedding completion order.
        let embedder = &self.embedder;
        let embedded: Vec<(usize, String, Vec<f32>)> =
            stream::iter(pieces.into_iter().enumerate())
                .map(move |(index, piece)| async move {
                    let vector = embedder.embed(&piece).await;
                    (index, piece, vector)
                })
                .buffered(self.embed_concurrency)
                .collect()
                .await;

        let mut chunks = Vec::with_capacity(total_chunks);
        for (index, piece, vector) in embedded {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("total_chunks".to_string(), json!(total_chunks));
            chunk_metadata.insert("chunk_index".to_string(), json!(index));
            chunk_metadata.insert("chunk_length".to_string(), json!(piece.chars().count()));

            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                owner_id: owner.to_string(),
                text: piece,
                vector,
                index,
                metadata: chunk_metadata,
                created_at,
            });
        }

        let committed = self.router.upsert(owner, &chunks).await?;

        tracing::info!(
            owner,
            document_id,
            chunks = committed,
            total_length,
            duration_ms = started.elapsed().as_millis() as u64,
            "document ingested"
        );

        Ok(IngestReceipt {
            document_id: document_id.to_string(),
            chunk_count: committed,
            total_length,
        })
    }

    /// Boundary operation: ingest caller text, generating a document id
    /// when none is supplied.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank owner or empty text.
    pub async fn ingest_text(
        &self,
        owner: &str,
        document_id: Option<String>,
        text: &str,
        metadata: Metadata,
    ) -> Result<IngestReceipt> {
        validate_owner(owner)?;
        if text.trim().is_empty() {
            return Err(AppError::Validation("text must not be empty".to_string()));
        }

        let document_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.ingest(owner, &document_id, text, metadata).await
    }

    /// Boundary operation: ingest an uploaded file.
    ///
    /// Only text-decodable MIME types (`text/plain`, `application/json`)
    /// are accepted; anything else is rejected here rather than silently
    /// stored.
    ///
    /// # Errors
    ///
    /// `Validation` for unsupported MIME types or non-UTF-8 content.
    pub async fn ingest_file(
        &self,
        owner: &str,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<IngestReceipt> {
        validate_owner(owner)?;

        // Strip parameters like "; charset=utf-8" before matching.
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        if !SUPPORTED_MIME_TYPES.contains(&essence) {
            return Err(AppError::Validation(format!(
                "unsupported MIME type: {} (supported: {})",
                mime_type,
                SUPPORTED_MIME_TYPES.join(", ")
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| AppError::Validation("file content is not valid UTF-8".to_string()))?;

        let mut metadata = Metadata::new();
        metadata.insert("filename".to_string(), json!(filename));
        metadata.insert("mime_type".to_string(), json!(essence));

        self.ingest_text(owner, None, text, metadata).await
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Embed `query_text` and rank the owner's chunks against it.
    pub async fn query(
        &self,
        owner: &str,
        query_text: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        let query_vector = self.embedder.embed(query_text).await;
        self.router
            .search(owner, &query_vector, limit, score_threshold)
            .await
    }

    /// Boundary operation: similarity search with caller-facing bounds.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty query, `limit` outside `1..=10`, or
    /// `threshold` outside `0.1..=1.0`.
    pub async fn search(
        &self,
        owner: &str,
        query_text: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        validate_owner(owner)?;
        if query_text.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".to_string()));
        }
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }
        if !(MIN_SEARCH_THRESHOLD..=1.0).contains(&threshold) {
            return Err(AppError::Validation(format!(
                "threshold must be between {} and 1.0",
                MIN_SEARCH_THRESHOLD
            )));
        }

        let started = Instant::now();
        let matches = self.query(owner, query_text, limit, threshold).await?;
        tracing::info!(
            owner,
            results = matches.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(matches)
    }

    /// Boundary operation: assemble a context window of at most
    /// `max_length` bytes from the best matches for `query_text`.
    ///
    /// Returns an empty string when nothing scores above the internal
    /// threshold or nothing fits the budget.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty query or `max_length` outside
    /// `1..=5000`.
    pub async fn get_context(
        &self,
        owner: &str,
        query_text: &str,
        max_length: usize,
    ) -> Result<String> {
        validate_owner(owner)?;
        if query_text.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".to_string()));
        }
        if max_length == 0 || max_length > MAX_CONTEXT_LENGTH {
            return Err(AppError::Validation(format!(
                "max_length must be between 1 and {}",
                MAX_CONTEXT_LENGTH
            )));
        }

        let matches = self
            .query(owner, query_text, CONTEXT_LIMIT, CONTEXT_THRESHOLD)
            .await?;
        Ok(assemble_context(&matches, max_length))
    }

    // ========================================================================
    // Deletion & Stats
    // ========================================================================

    /// Delete one document's chunks. Idempotent: deleting a document that
    /// does not exist succeeds.
    pub async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()> {
        validate_owner(owner)?;
        self.router.delete_document(owner, document_id).await?;
        tracing::info!(owner, document_id, "document deleted");
        Ok(())
    }

    /// Delete everything stored for an owner. Idempotent.
    pub async fn delete_namespace(&self, owner: &str) -> Result<()> {
        validate_owner(owner)?;
        self.router.delete_namespace(owner).await?;
        tracing::info!(owner, "namespace deleted");
        Ok(())
    }

    /// Document and chunk counts for an owner.
    pub async fn stats(&self, owner: &str) -> Result<NamespaceStats> {
        validate_owner(owner)?;
        self.router.stats(owner).await
    }
}

impl std::fmt::Debug for DocumentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentProcessor")
            .field("embed_concurrency", &self.embed_concurrency)
            .finish()
    }
}

/// Greedily append match blocks in descending score order until the next
/// block would push the accumulated length over `max_length`.
///
/// The returned string is trimmed and therefore never longer than
/// `max_length`.
pub fn assemble_context(matches: &[SearchMatch], max_length: usize) -> String {
    let mut assembled = String::new();

    for m in matches {
        let block = format!("\n\n--- Source (Score: {:.2}) ---\n{}", m.score, m.text);
        if assembled.len() + block.len() > max_length {
            break;
        }
        assembled.push_str(&block);
    }

    assembled.trim().to_string()
}

/// Normalize line endings and strip outer whitespace before chunking.
fn normalize_whitespace(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

fn validate_owner(owner: &str) -> Result<()> {
    if owner.trim().is_empty() {
        return Err(AppError::Validation("owner id required".to_string()));
    }
    Ok(())
}

#[cfg(feature = "qdrant")]
fn build_primary(config: &RetrievalConfig) -> Option<Arc<dyn VectorStore>> {
    let url = config.qdrant.url.as_deref()?;
    match crate::store::QdrantStore::new(url, config.qdrant.api_key.clone()) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            tracing::warn!(error = %err, "could not construct Qdrant client, running on fallback");
            None
        }
    }
}

#[cfg(not(feature = "qdrant"))]
fn build_primary(_config: &RetrievalConfig) -> Option<Arc<dyn VectorStore>> {
    None
}
