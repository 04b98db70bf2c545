//! Hybrid backend router with sticky failover.
//!
//! The router wraps the primary (Qdrant) and fallback (relational) stores
//! behind the single [`VectorStore`] contract. The active backend is chosen
//! once by a startup probe; afterwards every operation is attempted on the
//! active backend, and a primary failure demotes the router to the fallback
//! and retries the same logical operation exactly once. Demotion is sticky:
//! the router never re-probes the primary on its own, so transient errors
//! cannot make it flap between backends. Promotion back to the primary only
//! happens through an explicit [`HybridRouter::reprobe`].
//!
//! Callers only ever see an error when both backends fail the same
//! operation.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;

use super::vectorstore::VectorStore;
use crate::types::{AppError, Chunk, NamespaceStats, Result, SearchMatch};

/// Sentinel owner used for availability probes. The probe is a harmless
/// read: it touches no caller data and creates nothing.
const PROBE_OWNER: &str = "__braid_probe__";

/// Which backend the router currently sends operations to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    /// The preferred external vector engine.
    Primary,
    /// The always-available relational store.
    Fallback,
}

/// Failover router over a primary and a fallback [`VectorStore`].
pub struct HybridRouter {
    primary: Option<Arc<dyn VectorStore>>,
    fallback: Arc<dyn VectorStore>,
    active: RwLock<ActiveBackend>,
}

impl HybridRouter {
    /// Build a router, probing the primary once to decide the starting
    /// backend. A missing or unreachable primary starts the router on the
    /// fallback.
    pub async fn connect(
        primary: Option<Arc<dyn VectorStore>>,
        fallback: Arc<dyn VectorStore>,
    ) -> Self {
        let active = match &primary {
            Some(store) => match store.stats(PROBE_OWNER).await {
                Ok(_) => ActiveBackend::Primary,
                Err(err) => {
                    tracing::warn!(
                        backend = store.backend_name(),
                        error = %err,
                        "primary vector backend unavailable at startup, starting on fallback"
                    );
                    ActiveBackend::Fallback
                }
            },
            None => ActiveBackend::Fallback,
        };

        Self {
            primary,
            fallback,
            active: RwLock::new(active),
        }
    }

    /// The backend operations are currently routed to.
    pub fn active_backend(&self) -> ActiveBackend {
        *self.active.read()
    }

    /// Re-run the availability probe against the primary and update the
    /// active backend accordingly. This is the only promotion path back to
    /// the primary; call it from an admin action or at process restart.
    pub async fn reprobe(&self) -> ActiveBackend {
        let next = match &self.primary {
            Some(store) => match store.stats(PROBE_OWNER).await {
                Ok(_) => ActiveBackend::Primary,
                Err(err) => {
                    tracing::warn!(
                        backend = store.backend_name(),
                        error = %err,
                        "primary vector backend still unavailable"
                    );
                    ActiveBackend::Fallback
                }
            },
            None => ActiveBackend::Fallback,
        };

        let previous = {
            let mut active = self.active.write();
            std::mem::replace(&mut *active, next)
        };
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "vector backend changed after re-probe");
        }
        next
    }

    /// Run `op` against the active backend, demoting from primary to
    /// fallback (with a single retry) on failure.
    async fn with_failover<'a, T, F>(&'a self, operation: &str, op: F) -> Result<T>
    where
        F: Fn(&'a dyn VectorStore) -> BoxFuture<'a, Result<T>>,
    {
        if self.active_backend() == ActiveBackend::Primary {
            if let Some(primary) = &self.primary {
                match op(primary.as_ref()).await {
                    Ok(value) => return Ok(value),
                    Err(primary_err) => {
                        *self.active.write() = ActiveBackend::Fallback;
                        tracing::warn!(
                            operation,
                            backend = primary.backend_name(),
                            error = %primary_err,
                            "primary vector backend failed, demoting to fallback"
                        );

                        return op(self.fallback.as_ref()).await.map_err(|fallback_err| {
                            AppError::BackendExhausted(format!(
                                "{} failed on primary ({}) and fallback ({})",
                                operation, primary_err, fallback_err
                            ))
                        });
                    }
                }
            }
        }

        op(self.fallback.as_ref()).await
    }

    /// Make the owner's namespace ready on the active backend.
    pub async fn ensure_namespace(&self, owner: &str) -> Result<()> {
        self.with_failover("ensure_namespace", move |store| {
            Box::pin(store.ensure_namespace(owner))
        })
        .await
    }

    /// Insert or replace chunks on the active backend.
    pub async fn upsert(&self, owner: &str, chunks: &[Chunk]) -> Result<usize> {
        self.with_failover("upsert", move |store| Box::pin(store.upsert(owner, chunks)))
            .await
    }

    /// Similarity search on the active backend.
    pub async fn search(
        &self,
        owner: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        self.with_failover("search", move |store| {
            Box::pin(store.search(owner, query_vector, limit, score_threshold))
        })
        .await
    }

    /// Delete one document's chunks on the active backend.
    pub async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()> {
        self.with_failover("delete_document", move |store| {
            Box::pin(store.delete_document(owner, document_id))
        })
        .await
    }

    /// Delete the owner's namespace on the active backend.
    pub async fn delete_namespace(&self, owner: &str) -> Result<()> {
        self.with_failover("delete_namespace", move |store| {
            Box::pin(store.delete_namespace(owner))
        })
        .await
    }

    /// Storage statistics from the active backend.
    pub async fn stats(&self, owner: &str) -> Result<NamespaceStats> {
        self.with_failover("stats", move |store| Box::pin(store.stats(owner)))
            .await
    }
}

impl std::fmt::Debug for HybridRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRouter")
            .field("has_primary", &self.primary.is_some())
            .field("active", &self.active_backend())
            .finish()
    }
}
