//! Vectorization of chunk source files into a [`VectorStore`].
//!
//! Records are embedded in batches and upserted. A batch that fails to embed
//! (or yields an empty vector) or fails to upsert is counted as failed and
//! indexing continues with the next batch.

use evidex_context::sources::{CHUNK_FILE_SUFFIX, load_chunk_document, records_from_document};
use evidex_core::error::ContextError;
use evidex_core::{Embedder, EvidenceRecord, StoredChunk, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 24;

/// How chunk files map onto collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// One collection per chunk file, named by [`collection_name_for`].
    PerSource,
    /// Every file goes into one named collection.
    OneCollection(String),
}

impl CollectionMode {
    /// Collections a retrieval over `files` should query.
    pub fn collections_for(&self, files: &[PathBuf], prefix: &str) -> Vec<String> {
        match self {
            Self::PerSource => files
                .iter()
                .map(|f| collection_name_for(f, prefix))
                .collect(),
            Self::OneCollection(name) => vec![name.clone()],
        }
    }
}

impl FromStr for CollectionMode {
    type Err = String;

    /// Parses `per_source` or `one_collection[:name]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, name) = s.split_once(':').unwrap_or((s, ""));
        match kind.replace('-', "_").as_str() {
            "per_source" => Ok(Self::PerSource),
            "one_collection" if !name.trim().is_empty() => {
                Ok(Self::OneCollection(name.trim().to_string()))
            }
            "one_collection" => Err("one_collection needs a name (one_collection:<name>)".into()),
            other => Err(format!(
                "unknown collection mode '{other}' (expected per_source or one_collection)"
            )),
        }
    }
}

/// `paper.pdf.chunks.json` → `{prefix}paper_pdf`.
pub fn collection_name_for(path: &Path, prefix: &str) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = name.strip_suffix(CHUNK_FILE_SUFFIX).unwrap_or(name);
    let stem = stem.replace(['.', '-'], "_");
    format!("{prefix}{stem}")
}

/// Per-collection outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub added: usize,
    pub failed: usize,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files: usize,
    pub collections: Vec<CollectionReport>,
    /// Malformed chunk entries skipped while loading.
    pub skipped: usize,
}

impl IndexReport {
    pub fn added(&self) -> usize {
        self.collections.iter().map(|c| c.added).sum()
    }

    pub fn failed(&self) -> usize {
        self.collections.iter().map(|c| c.failed).sum()
    }

    fn entry(&mut self, collection: &str) -> &mut CollectionReport {
        let pos = match self
            .collections
            .iter()
            .position(|c| c.collection == collection)
        {
            Some(pos) => pos,
            None => {
                self.collections.push(CollectionReport {
                    collection: collection.to_string(),
                    ..Default::default()
                });
                self.collections.len() - 1
            }
        };
        &mut self.collections[pos]
    }
}

/// Embeds chunk files and upserts them into a store.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    prefix: String,
    embed_model: String,
}

impl Indexer {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            prefix: String::new(),
            embed_model: String::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Recorded as `embedding_model` in every chunk's metadata.
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Index every file under `mode`.
    ///
    /// A file that cannot be read or parsed aborts the run; bad entries and
    /// failed batches do not.
    pub async fn index_files(
        &self,
        files: &[PathBuf],
        mode: &CollectionMode,
    ) -> Result<IndexReport, ContextError> {
        let mut report = IndexReport {
            files: files.len(),
            ..Default::default()
        };

        for path in files {
            let doc = load_chunk_document(path)?;
            let records = records_from_document(&doc);
            report.skipped += doc.chunks.len() - records.len();

            let collection = match mode {
                CollectionMode::PerSource => collection_name_for(path, &self.prefix),
                CollectionMode::OneCollection(name) => name.clone(),
            };
            let (added, failed) = self.index_records(&collection, &records).await;

            let entry = report.entry(&collection);
            entry.added += added;
            entry.failed += failed;
            info!(
                file = %path.display(),
                collection = %collection,
                added,
                failed,
                "Chunk file indexed"
            );
        }
        Ok(report)
    }

    /// Embed and upsert `records` in batches. Returns (added, failed).
    pub async fn index_records(&self, collection: &str, records: &[EvidenceRecord]) -> (usize, usize) {
        let mut added = 0;
        let mut failed = 0;

        for batch in records.chunks(self.batch_size) {
            match self.index_batch(collection, batch).await {
                Ok(n) => added += n,
                Err(reason) => {
                    warn!(collection, items = batch.len(), error = %reason, "Failed batch upsert");
                    failed += batch.len();
                }
            }
        }
        (added, failed)
    }

    async fn index_batch(&self, collection: &str, batch: &[EvidenceRecord]) -> Result<usize, String> {
        let texts: Vec<String> = batch.iter().map(|r| r.text().to_string()).collect();
        let embeddings = self.embedder.embed(&texts).await.map_err(|e| e.to_string())?;
        if embeddings.len() != batch.len() || embeddings.iter().any(Vec::is_empty) {
            return Err("one or more embeddings were empty; check the embedding service and model".into());
        }

        let chunks = batch
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| StoredChunk {
                id: record.id().to_string(),
                document: record.text().to_string(),
                metadata: self.stored_metadata(record),
                embedding,
            })
            .collect();

        self.store
            .upsert(collection, chunks)
            .await
            .map_err(|e| e.to_string())
    }

    /// Scalar metadata plus `source` and `embedding_model` when not already set.
    fn stored_metadata(&self, record: &EvidenceRecord) -> Map<String, Value> {
        let mut metadata: Map<String, Value> = record
            .metadata()
            .iter()
            .filter(|(_, v)| !matches!(v, evidex_core::MetadataValue::Null))
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect();
        if !record.source().is_empty() {
            metadata
                .entry("source")
                .or_insert_with(|| Value::from(record.source()));
        }
        if !self.embed_model.is_empty() {
            metadata
                .entry("embedding_model")
                .or_insert_with(|| Value::from(self.embed_model.as_str()));
        }
        metadata
    }
}
