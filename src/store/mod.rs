//! Chunk storage backends and the failover router.
//!
//! Two interchangeable backends implement one capability set:
//! - **Qdrant** (primary): external vector engine, cosine distance, one
//!   collection per owner. Enabled via the `qdrant` feature.
//! - **Relational** (fallback): SQLite/libsql rows with in-process cosine
//!   scoring. Always available.
//!
//! [`HybridRouter`] owns backend selection: it probes the primary once at
//! construction and demotes to the fallback (stickily) when the primary
//! fails mid-flight.

// Vector store abstraction layer
pub mod vectorstore;

// Backend implementations
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod relational;

// Failover routing
pub mod router;

// Re-exports
pub use relational::RelationalStore;
pub use router::{ActiveBackend, HybridRouter};
pub use vectorstore::{InMemoryStore, VectorStore};

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantStore;
