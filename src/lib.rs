//! # braid — hybrid document retrieval for RAG chatbots
//!
//! `braid` is the retrieval core a chatbot server mounts behind its HTTP
//! layer: it ingests text or file content for a logical owner (a chatbot),
//! splits it into overlapping chunks, embeds each chunk into a
//! fixed-dimension vector, stores the chunks in a primary vector engine
//! with automatic failover to a relational fallback, and answers the
//! similarity queries used to assemble bounded-length context windows for
//! generation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use braid::{DocumentProcessor, RetrievalConfig, Metadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY / QDRANT_URL / BRAID_* from the environment;
//!     // everything degrades gracefully when unset.
//!     let config = RetrievalConfig::from_env()?;
//!     let processor = DocumentProcessor::connect(&config).await?;
//!
//!     let receipt = processor
//!         .ingest_text("my-bot", None, "Shipping is free above 50 EUR.", Metadata::new())
//!         .await?;
//!     println!("stored {} chunks", receipt.chunk_count);
//!
//!     let context = processor
//!         .get_context("my-bot", "how much does shipping cost?", 3000)
//!         .await?;
//!     println!("{}", context);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ingest ──► TextChunker ──► EmbeddingService ──► HybridRouter ──► QdrantStore
//!                │                  │                  │  (sticky      │ failover
//!                │            Gemini or local          │   demotion)   ▼
//!                └── validation     fallback           └────────► RelationalStore
//! ```
//!
//! Two failure domains are absorbed below the public API: an unreachable
//! embedding provider falls back to a deterministic local embedding, and a
//! failing primary vector engine demotes the router to the relational
//! fallback. Callers only ever see validation errors and the case where
//! both backends fail the same operation.
//!
//! ## Modules
//!
//! - [`rag`] - Chunking, embeddings, and the document processor
//! - [`store`] - Vector store backends and the failover router
//! - [`config`] - Environment-driven configuration
//! - [`types`] - Shared data model and error taxonomy

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Environment-driven configuration.
pub mod config;
/// Retrieval pipeline: chunker, embeddings, processor.
pub mod rag;
/// Storage backends and the failover router.
pub mod store;
/// Shared types and error handling.
pub mod types;

pub use config::{EmbeddingConfig, QdrantConfig, RetrievalConfig};
pub use rag::chunker::TextChunker;
pub use rag::embeddings::EmbeddingService;
pub use rag::processor::{assemble_context, DocumentProcessor};
pub use store::{ActiveBackend, HybridRouter, InMemoryStore, RelationalStore, VectorStore};
#[cfg(feature = "qdrant")]
pub use store::QdrantStore;
pub use types::{
    AppError, Chunk, IngestReceipt, Metadata, NamespaceStats, Result, SearchMatch, EMBEDDING_DIM,
};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a global tracing subscriber honoring `RUST_LOG`.
///
/// Intended for binaries and integration tests embedding this crate;
/// library callers that already have a subscriber should skip it. Calling
/// it twice is harmless — the second call is ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
