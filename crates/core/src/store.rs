//! VectorStore trait: named collections of embedded evidence.
//!
//! The query result keeps the nested per-batch shape vector databases such as
//! Chroma return (`ids[batch][hit]`). evidex always queries one vector at a
//! time and reads batch 0.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw query response, one inner list per query vector.
///
/// Lists are not guaranteed to be length-aligned; consumers must tolerate
/// ragged responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBatch {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Vec<Vec<Option<serde_json::Map<String, serde_json::Value>>>>,
    #[serde(default)]
    pub distances: Vec<Vec<f64>>,
}

impl QueryBatch {
    /// A response holding a single batch.
    pub fn single(
        ids: Vec<String>,
        documents: Vec<Option<String>>,
        metadatas: Vec<Option<serde_json::Map<String, serde_json::Value>>>,
        distances: Vec<f64>,
    ) -> Self {
        Self {
            ids: vec![ids],
            documents: vec![documents],
            metadatas: vec![metadatas],
            distances: vec![distances],
        }
    }
}

/// One embedded chunk to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub embedding: Vec<f32>,
}

/// A vector database holding named collections.
///
/// Implementations: Chroma (HTTP), in-memory (for testing).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "chroma", "in_memory").
    fn name(&self) -> &str;

    /// Nearest-neighbour query against one collection.
    ///
    /// Querying a collection that does not exist is an error.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&serde_json::Value>,
    ) -> Result<QueryBatch, StoreError>;

    /// Insert or replace chunks, creating the collection on demand.
    async fn upsert(&self, collection: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError>;

    /// Names of all collections.
    async fn collections(&self) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_batch_deserializes_partial_payload() {
        let batch: QueryBatch =
            serde_json::from_str(r#"{"ids": [["a", "b"]], "distances": [[0.1, 0.2]]}"#).unwrap();
        assert_eq!(batch.ids[0], vec!["a", "b"]);
        assert!(batch.documents.is_empty());
    }

    #[test]
    fn single_wraps_one_batch() {
        let batch = QueryBatch::single(vec!["a".into()], vec![Some("x".into())], vec![None], vec![0.5]);
        assert_eq!(batch.ids.len(), 1);
        assert_eq!(batch.distances[0][0], 0.5);
    }
}
