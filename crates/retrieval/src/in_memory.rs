//! In-memory vector store: useful for testing and offline runs.

use crate::vector::nearest;
use async_trait::async_trait;
use evidex_core::error::StoreError;
use evidex_core::{QueryBatch, StoredChunk, VectorStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A vector store keeping every collection in a `HashMap`.
///
/// Distances are cosine distances. Filters are equality matches on metadata
/// (`{"key": value}` or `{"key": {"$eq": value}}`), all keys must match.
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<StoredChunk>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of chunks in a collection (0 if it does not exist).
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&Value>,
    ) -> Result<QueryBatch, StoreError> {
        let collections = self.collections.read().await;
        let chunks = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let conditions = match filter {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(StoreError::QueryFailed {
                    collection: collection.to_string(),
                    reason: format!("filter must be an object, got {other}"),
                });
            }
        };

        let candidates = chunks
            .iter()
            .filter(|chunk| matches_filter(&chunk.metadata, &conditions));

        let mut ids = Vec::new();
        let mut documents = Vec::new();
        let mut metadatas = Vec::new();
        let mut distances = Vec::new();
        for (distance, chunk) in nearest(candidates, embedding, limit) {
            ids.push(chunk.id.clone());
            documents.push(Some(chunk.document.clone()));
            metadatas.push(Some(chunk.metadata.clone()));
            distances.push(distance);
        }

        Ok(QueryBatch::single(ids, documents, metadatas, distances))
    }

    async fn upsert(&self, collection: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        let count = chunks.len();

        for chunk in chunks {
            match stored.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => stored.push(chunk),
            }
        }
        Ok(count)
    }

    async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

fn matches_filter(metadata: &Map<String, Value>, conditions: &Map<String, Value>) -> bool {
    conditions.iter().all(|(key, expected)| {
        let expected = match expected {
            Value::Object(op) if op.contains_key("$eq") => &op["$eq"],
            other => other,
        };
        metadata.get(key) == Some(expected)
    })
}
