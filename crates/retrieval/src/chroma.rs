//! Chroma vector store over HTTP.
//!
//! Talks to a Chroma server's v1 REST API:
//! - `GET  /api/v1/collections`            list collections
//! - `GET  /api/v1/collections/{name}`     resolve a name to an id
//! - `POST /api/v1/collections`            create (`get_or_create`)
//! - `POST /api/v1/collections/{id}/query`
//! - `POST /api/v1/collections/{id}/upsert`

use async_trait::async_trait;
use evidex_core::error::StoreError;
use evidex_core::{QueryBatch, StoredChunk, VectorStore};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";

/// A Chroma server reached over HTTP.
pub struct ChromaStore {
    base_url: String,
    tenant: String,
    database: String,
    client: reqwest::Client,
}

impl ChromaStore {
    /// Connect to `http://{host}:{port}` (or `host` as-is if it has a scheme).
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}:{port}")
        };

        Ok(Self {
            base_url,
            tenant: DEFAULT_TENANT.into(),
            database: DEFAULT_DATABASE.into(),
            client,
        })
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>, database: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self.database = database.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn scope(&self) -> [(&str, &str); 2] {
        [("tenant", self.tenant.as_str()), ("database", self.database.as_str())]
    }

    async fn collection_id(&self, name: &str) -> Result<String, StoreError> {
        let url = format!("{}/api/v1/collections/{name}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.scope())
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            // Chroma reports a missing collection as 404 or as a 500 ValueError
            debug!(collection = name, status = response.status().as_u16(), "Collection lookup failed");
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }

        let info: ApiCollection = response
            .json()
            .await
            .map_err(|e| StoreError::Network(format!("invalid collection payload: {e}")))?;
        Ok(info.id)
    }

    async fn get_or_create(&self, name: &str) -> Result<String, StoreError> {
        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&self.scope())
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UpsertFailed {
                collection: name.to_string(),
                reason: format!("create returned {status}: {body}"),
            });
        }

        let info: ApiCollection = response
            .json()
            .await
            .map_err(|e| StoreError::Network(format!("invalid collection payload: {e}")))?;
        Ok(info.id)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&Value>,
    ) -> Result<QueryBatch, StoreError> {
        let id = self.collection_id(collection).await?;
        let url = format!("{}/api/v1/collections/{id}/query", self.base_url);

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": limit,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter.clone();
        }

        debug!(collection, limit, "Querying Chroma collection");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(collection, status, body = %body, "Chroma query failed");
            return Err(StoreError::QueryFailed {
                collection: collection.to_string(),
                reason: format!("status {status}: {body}"),
            });
        }

        let raw: ApiQueryResponse = response.json().await.map_err(|e| StoreError::QueryFailed {
            collection: collection.to_string(),
            reason: format!("failed to parse response: {e}"),
        })?;
        Ok(raw.into_batch())
    }

    async fn upsert(&self, collection: &str, chunks: Vec<StoredChunk>) -> Result<usize, StoreError> {
        let id = self.get_or_create(collection).await?;
        if chunks.is_empty() {
            return Ok(0);
        }
        let url = format!("{}/api/v1/collections/{id}/upsert", self.base_url);
        let count = chunks.len();

        let mut ids = Vec::with_capacity(count);
        let mut documents = Vec::with_capacity(count);
        let mut metadatas = Vec::with_capacity(count);
        let mut embeddings = Vec::with_capacity(count);
        for chunk in chunks {
            ids.push(chunk.id);
            documents.push(chunk.document);
            metadatas.push(chunk.metadata);
            embeddings.push(chunk.embedding);
        }

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "ids": ids,
                "documents": documents,
                "metadatas": metadatas,
                "embeddings": embeddings,
            }))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UpsertFailed {
                collection: collection.to_string(),
                reason: format!("status {status}: {body}"),
            });
        }
        Ok(count)
    }

    async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.scope())
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Network(format!(
                "listing collections returned {}",
                response.status().as_u16()
            )));
        }

        let listed: Vec<ApiCollection> = response
            .json()
            .await
            .map_err(|e| StoreError::Network(format!("invalid collection list: {e}")))?;
        let mut names: Vec<String> = listed.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }
}

// ── API types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiCollection {
    id: String,
    #[serde(default)]
    name: String,
}

/// Chroma query payload; every list and entry may be null.
#[derive(Deserialize, Default)]
struct ApiQueryResponse {
    #[serde(default)]
    ids: Option<Vec<Vec<String>>>,
    #[serde(default)]
    documents: Option<Vec<Option<Vec<Option<String>>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Vec<Option<Map<String, Value>>>>>>,
    #[serde(default)]
    distances: Option<Vec<Option<Vec<Option<f64>>>>>,
}

impl ApiQueryResponse {
    fn into_batch(self) -> QueryBatch {
        QueryBatch {
            ids: self.ids.unwrap_or_default(),
            documents: flatten_nulls(self.documents),
            metadatas: flatten_nulls(self.metadatas),
            // a null distance ranks last
            distances: flatten_nulls(self.distances)
                .into_iter()
                .map(|batch| {
                    batch
                        .into_iter()
                        .map(|d| d.unwrap_or(f64::INFINITY))
                        .collect()
                })
                .collect(),
        }
    }
}

fn flatten_nulls<T>(lists: Option<Vec<Option<Vec<T>>>>) -> Vec<Vec<T>> {
    lists
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}
