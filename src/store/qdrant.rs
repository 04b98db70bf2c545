//! Qdrant primary vector store.
//!
//! The preferred backend: vector storage and nearest-neighbor search are
//! delegated to a Qdrant server using cosine distance. Each owner gets its
//! own collection, created lazily with the fixed embedding dimension on
//! first use.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue,
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter,
    Match, PayloadIncludeSelector, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::{HashMap, HashSet};

use super::vectorstore::VectorStore;
use crate::types::{AppError, Chunk, Metadata, NamespaceStats, Result, SearchMatch, EMBEDDING_DIM};

/// Page size for scroll-based stats aggregation.
const SCROLL_PAGE: u32 = 256;

/// Qdrant-backed vector store. Requires a running Qdrant server.
pub struct QdrantStore {
    client: Qdrant,
}

/// Map an owner id to its collection name.
///
/// Owner ids are caller-supplied; anything outside `[A-Za-z0-9_-]` is
/// replaced so the result is always a valid collection name.
fn collection_name(owner: &str) -> String {
    let safe: String = owner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("chatbot_{}", safe)
}

impl QdrantStore {
    /// Connect to a Qdrant server.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the client cannot be constructed.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = if let Some(key) = api_key {
            Qdrant::from_url(url)
                .api_key(key)
                .build()
                .map_err(|e| AppError::Backend(format!("Failed to create Qdrant client: {}", e)))?
        } else {
            Qdrant::from_url(url)
                .build()
                .map_err(|e| AppError::Backend(format!("Failed to create Qdrant client: {}", e)))?
        };

        Ok(Self { client })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| AppError::Backend(format!("Failed to list collections: {}", e)))?;

        Ok(collections.collections.iter().any(|c| c.name == name))
    }

    fn parse_search_results(
        response: qdrant_client::qdrant::SearchResponse,
    ) -> Vec<SearchMatch> {
        response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let payload = scored_point.payload;
                let text = payload.get("content")?.as_str()?.to_string();
                let document_id = payload.get("document_id")?.as_str()?.to_string();
                let metadata: Metadata = payload
                    .get("metadata")
                    .and_then(|v| serde_json::from_value(v.clone().into()).ok())
                    .unwrap_or_default();

                let chunk_id = match scored_point.id?.point_id_options? {
                    qdrant_client::qdrant::point_id::PointIdOptions::Num(num) => num.to_string(),
                    qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid) => uuid,
                };

                Some(SearchMatch {
                    chunk_id,
                    document_id,
                    text,
                    score: scored_point.score,
                    metadata,
                })
            })
            .collect()
    }

    fn document_filter(document_id: &str) -> Filter {
        let condition = Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: "document_id".to_string(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keyword(document_id.to_string())),
                }),
                ..Default::default()
            })),
        };
        Filter::must(vec![condition])
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_namespace(&self, owner: &str) -> Result<()> {
        let name = collection_name(owner);
        if self.collection_exists(&name).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&name).vectors_config(VectorParamsBuilder::new(
                    EMBEDDING_DIM as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to create collection: {}", e)))?;

        Ok(())
    }

    async fn upsert(&self, owner: &str, chunks: &[Chunk]) -> Result<usize> {
        let name = collection_name(owner);
        let mut points = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("content".to_string(), chunk.text.clone().into());
            payload.insert("document_id".to_string(), chunk.document_id.clone().into());
            payload.insert("chunk_index".to_string(), (chunk.index as i64).into());
            payload.insert(
                "metadata".to_string(),
                serde_json::Value::Object(chunk.metadata.clone()).into(),
            );
            payload.insert("created_at".to_string(), chunk.created_at.into());

            points.push(PointStruct::new(
                chunk.id.clone(),
                chunk.vector.clone(),
                payload,
            ));
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&name, points).wait(true))
            .await
            .map_err(|e| AppError::Backend(format!("Failed to upsert points: {}", e)))?;

        Ok(count)
    }

    async fn search(
        &self,
        owner: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchMatch>> {
        let name = collection_name(owner);
        if !self.collection_exists(&name).await? {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&name, query_vector.to_vec(), limit as u64)
                    .score_threshold(score_threshold)
                    .with_payload(true),
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to search: {}", e)))?;

        Ok(Self::parse_search_results(response))
    }

    async fn delete_document(&self, owner: &str, document_id: &str) -> Result<()> {
        let name = collection_name(owner);
        if !self.collection_exists(&name).await? {
            return Ok(());
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&name)
                    .points(Self::document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(|e| AppError::Backend(format!("Failed to delete document points: {}", e)))?;

        Ok(())
    }

    async fn delete_namespace(&self, owner: &str) -> Result<()> {
        let name = collection_name(owner);
        if !self.collection_exists(&name).await? {
            return Ok(());
        }

        self.client
            .delete_collection(&name)
            .await
            .map_err(|e| AppError::Backend(format!("Failed to delete collection: {}", e)))?;

        Ok(())
    }

    async fn stats(&self, owner: &str) -> Result<NamespaceStats> {
        let name = collection_name(owner);
        if !self.collection_exists(&name).await? {
            return Ok(NamespaceStats {
                document_count: 0,
                chunk_count: 0,
            });
        }

        let info = self
            .client
            .collection_info(&name)
            .await
            .map_err(|e| AppError::Backend(format!("Failed to get collection info: {}", e)))?;

        let chunk_count = info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize;

        // Qdrant has no server-side distinct, so walk the payloads. Only
        // the document_id field travels over the wire.
        let mut documents: HashSet<String> = HashSet::new();
        let mut offset = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(&name)
                .limit(SCROLL_PAGE)
                .with_payload(PayloadIncludeSelector {
                    fields: vec!["document_id".to_string()],
                })
                .with_vectors(false);
            if let Some(point_id) = offset {
                builder = builder.offset(point_id);
            }

            let page = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| AppError::Backend(format!("Failed to scroll points: {}", e)))?;

            for point in page.result {
                if let Some(document_id) =
                    point.payload.get("document_id").and_then(|v| v.as_str())
                {
                    documents.insert(document_id.to_string());
                }
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(NamespaceStats {
            document_count: documents.len(),
            chunk_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_sanitized() {
        assert_eq!(collection_name("bot-42"), "chatbot_bot-42");
        assert_eq!(collection_name("my bot!"), "chatbot_my_bot_");
        assert_eq!(
            collection_name("550e8400-e29b-41d4-a716-446655440000"),
            "chatbot_550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
