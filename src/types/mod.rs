//! Common types and error handling for the retrieval pipeline.
//!
//! Everything that crosses a module boundary lives here: the chunk data
//! model, search results, ingestion receipts, and the crate-wide error
//! taxonomy.

use serde::{Deserialize, Serialize};

/// Dimensionality of every stored embedding vector, whichever path
/// produced it (provider or local fallback).
pub const EMBEDDING_DIM: usize = 768;

/// Open key/value metadata attached to chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============= Chunk Model =============

/// A contiguous, overlap-adjusted substring of a source document stored
/// together with its embedding vector.
///
/// Chunks are immutable once stored: correction is delete + re-ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier, unique within the owning document.
    pub id: String,
    /// Owning document identifier.
    pub document_id: String,
    /// Tenant scope (chatbot id). No operation crosses owners.
    pub owner_id: String,
    /// Non-empty trimmed chunk text.
    pub text: String,
    /// Embedding vector of length [`EMBEDDING_DIM`].
    pub vector: Vec<f32>,
    /// 0-based position among sibling chunks of the same document.
    pub index: usize,
    /// Caller-supplied metadata merged with derived fields
    /// (`total_chunks`, `chunk_length`).
    pub metadata: Metadata,
    /// Unix timestamp of creation.
    pub created_at: i64,
}

/// A ranked similarity match returned by search.
///
/// The stored vector is never echoed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Matched chunk id.
    pub chunk_id: String,
    /// Document the chunk belongs to.
    pub document_id: String,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity score (higher is better).
    pub score: f32,
    /// Chunk metadata.
    pub metadata: Metadata,
}

/// Result of a successful document ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    /// Document id (caller-supplied or generated).
    pub document_id: String,
    /// Number of chunks committed.
    pub chunk_count: usize,
    /// Total character length of the normalized source text.
    pub total_length: usize,
}

/// Per-owner storage statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NamespaceStats {
    /// Number of distinct documents stored for the owner.
    pub document_count: usize,
    /// Number of chunks stored for the owner.
    pub chunk_count: usize,
}

// ============= Error Types =============

/// Crate-wide error taxonomy.
///
/// Provider failures that the pipeline can absorb locally (embedding
/// fallback, backend failover) never surface through this type; callers
/// only see validation errors and dual-backend exhaustion.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid caller input: empty text, unsupported MIME type,
    /// out-of-range limit/threshold/max_length. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding provider failure. Absorbed by the deterministic
    /// fallback inside the embedder; only carried here for provider
    /// construction problems.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// A single vector backend failed an operation.
    #[error("Vector backend error: {0}")]
    Backend(String),

    /// Both the primary and the fallback backend failed the same
    /// logical operation. Distinguishes "retrieval unavailable" from
    /// an empty result set.
    #[error("All retrieval backends failed: {0}")]
    BackendExhausted(String),

    /// Missing or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;
