//! Environment-driven configuration.
//!
//! All settings have working defaults so the pipeline can run with no
//! configuration at all: without `GEMINI_API_KEY` embeddings use the
//! deterministic local fallback, and without `QDRANT_URL` the router runs
//! permanently on the relational fallback store.

use serde::Deserialize;
use std::env;

use crate::types::{AppError, Result};

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters. Must be smaller
    /// than `chunk_size`.
    pub chunk_overlap: usize,
    /// Maximum concurrent embedding calls per ingest. Bounds pressure on
    /// the embedding provider; not correctness-affecting.
    pub embed_concurrency: usize,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Primary vector engine settings. `None` url means no primary.
    pub qdrant: QdrantConfig,
    /// Path to the fallback SQLite database. `None` for in-memory.
    pub database_path: Option<String>,
}

/// Embedding provider (Gemini `embedContent`) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// API key. `None` disables the provider path entirely.
    pub api_key: Option<String>,
    /// Base URL of the Generative Language API.
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

/// Qdrant connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QdrantConfig {
    /// Server URL (e.g. `http://localhost:6334`). `None` means the
    /// primary backend is unconfigured.
    pub url: Option<String>,
    /// Optional API key.
    pub api_key: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            embed_concurrency: 4,
            embedding: EmbeddingConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "text-embedding-004".to_string(),
                timeout_secs: 30,
            },
            qdrant: QdrantConfig {
                url: None,
                api_key: None,
            },
            database_path: None,
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from environment variables (and `.env` if
    /// present), falling back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unparsable numeric values or
    /// `BRAID_CHUNK_OVERLAP >= BRAID_CHUNK_SIZE`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let chunk_size = parse_var("BRAID_CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = parse_var("BRAID_CHUNK_OVERLAP", defaults.chunk_overlap)?;
        if chunk_overlap >= chunk_size {
            return Err(AppError::Configuration(format!(
                "BRAID_CHUNK_OVERLAP ({}) must be smaller than BRAID_CHUNK_SIZE ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            embed_concurrency: parse_var("BRAID_EMBED_CONCURRENCY", defaults.embed_concurrency)?,
            embedding: EmbeddingConfig {
                api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
                base_url: env::var("GEMINI_BASE_URL")
                    .unwrap_or(defaults.embedding.base_url),
                model: env::var("BRAID_EMBEDDING_MODEL").unwrap_or(defaults.embedding.model),
                timeout_secs: parse_var(
                    "BRAID_EMBED_TIMEOUT_SECS",
                    defaults.embedding.timeout_secs,
                )?,
            },
            qdrant: QdrantConfig {
                url: env::var("QDRANT_URL").ok().filter(|u| !u.is_empty()),
                api_key: env::var("QDRANT_API_KEY").ok(),
            },
            database_path: env::var("BRAID_DATABASE_PATH")
                .ok()
                .filter(|p| !p.is_empty() && p != ":memory:"),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            AppError::Configuration(format!("{} is not a valid value for {}", raw, key))
        }),
        Err(_) => Ok(default),
    }
}
