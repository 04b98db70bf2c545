//! Retrieval pipeline components.
//!
//! The ingest/query flow runs through three stages:
//!
//! 1. **Chunking** — [`chunker`] splits a document into overlapping
//!    character windows with natural-boundary snapping.
//! 2. **Embedding** — [`embeddings`] turns each chunk (or query) into a
//!    fixed-dimension vector, preferring the remote provider and falling
//!    back to a deterministic local embedding.
//! 3. **Orchestration** — [`processor`] wires chunker, embedder, and the
//!    backend router together and exposes the operations the application
//!    layer consumes: ingest, search, context assembly, deletion.

pub mod chunker;
pub mod embeddings;
pub mod processor;
