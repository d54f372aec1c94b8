//! Multi-collection retrieval service.
//!
//! One `retrieve` call builds one query string, embeds it once, and queries
//! each named collection in turn. Results are merged, sorted by ascending
//! distance, deduplicated by id (first occurrence after the sort wins, so the
//! lowest distance survives), and capped.
//!
//! A collection whose query fails is skipped with a warning; failing to embed
//! the query fails the whole call.

use crate::query::{DEFAULT_QUERY_TEMPLATE, build_query};
use chrono::Utc;
use evidex_context::{BlockWriter, truncate_text};
use evidex_core::error::{EmbeddingError, RetrievalError};
use evidex_core::{
    Embedder, EventBus, EvidenceRecord, Metadata, MetadataValue, QueryBatch, RunEvent, VectorStore,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_PER_COLLECTION_LIMIT: usize = 6;
pub const DEFAULT_MAX_TOTAL_RESULTS: usize = 12;
pub const DEFAULT_EVIDENCE_MAX_TOTAL_CHARS: usize = 18_000;
pub const DEFAULT_EVIDENCE_MAX_CHUNK_CHARS: usize = 2_500;

// ── Types ─────────────────────────────────────────────────────────────────

/// Parameters of one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub root_feature: String,
    pub domain: String,
    pub collections: Vec<String>,
    pub query_template: String,
    pub extra: BTreeMap<String, String>,
    pub per_collection_limit: usize,
    pub max_total_results: usize,
    /// Metadata filter handed to the store unchanged.
    pub filter: Option<serde_json::Value>,
}

impl RetrievalRequest {
    pub fn new(
        root_feature: impl Into<String>,
        domain: impl Into<String>,
        collections: Vec<String>,
    ) -> Self {
        Self {
            root_feature: root_feature.into(),
            domain: domain.into(),
            collections,
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
            extra: BTreeMap::new(),
            per_collection_limit: DEFAULT_PER_COLLECTION_LIMIT,
            max_total_results: DEFAULT_MAX_TOTAL_RESULTS,
            filter: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }

    pub fn with_limits(mut self, per_collection_limit: usize, max_total_results: usize) -> Self {
        self.per_collection_limit = per_collection_limit;
        self.max_total_results = max_total_results;
        self
    }

    pub fn with_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A record together with where it was found and how close it was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedRecord {
    pub collection: String,
    pub distance: f64,
    pub record: EvidenceRecord,
}

/// Ranked, deduplicated output of one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub records: Vec<RetrievedRecord>,
}

impl RetrievalResult {
    /// The bare records, relevance set to distance, in ranked order.
    pub fn evidence_records(&self) -> Vec<EvidenceRecord> {
        self.records.iter().map(|r| r.record.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

// ── Service ───────────────────────────────────────────────────────────────

/// Queries a [`VectorStore`] with embeddings from an [`Embedder`].
pub struct RetrievalService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Option<Arc<EventBus>>,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Build the query, embed it, query every collection, then merge.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RetrievalError> {
        if request.collections.is_empty() {
            return Err(RetrievalError::NoCollections);
        }
        let started = Instant::now();

        let query = build_query(
            &request.root_feature,
            &request.domain,
            &request.query_template,
            &request.extra,
        );
        let embedding = self.embed_query(&query).await?;

        let mut merged = Vec::new();
        for collection in &request.collections {
            match self
                .store
                .query(
                    collection,
                    &embedding,
                    request.per_collection_limit,
                    request.filter.as_ref(),
                )
                .await
            {
                Ok(batch) => {
                    let hits = flatten(batch, collection);
                    debug!(collection = %collection, hits = hits.len(), "Collection queried");
                    merged.extend(hits);
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Retrieval skipped collection");
                    self.publish(RunEvent::CollectionSkipped {
                        collection: collection.clone(),
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        let records = rank_and_dedup(merged, request.max_total_results);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            store = self.store.name(),
            collections = request.collections.len(),
            records = records.len(),
            duration_ms,
            "Retrieval completed"
        );
        self.publish(RunEvent::RetrievalCompleted {
            collections: request.collections.len(),
            records: records.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(RetrievalResult { query, records })
    }

    /// Render a result as prompt evidence; see [`format_evidence`].
    pub fn to_prompt_text(
        &self,
        result: &RetrievalResult,
        max_total_chars: usize,
        max_chunk_chars: usize,
    ) -> String {
        format_evidence(&result.records, max_total_chars, max_chunk_chars)
    }

    /// [`to_prompt_text`](Self::to_prompt_text) plus the ids it rendered.
    pub fn to_prompt_evidence(
        &self,
        result: &RetrievalResult,
        max_total_chars: usize,
        max_chunk_chars: usize,
    ) -> RenderedEvidence {
        format_evidence_with_stats(&result.records, max_total_chars, max_chunk_chars)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        match vectors.into_iter().next() {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(EmbeddingError::Empty),
        }
    }

    fn publish(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────

/// Read batch 0 of a query response, truncated to the common prefix of its
/// four lists. Hits that do not make valid records are skipped.
fn flatten(batch: QueryBatch, collection: &str) -> Vec<RetrievedRecord> {
    let QueryBatch {
        ids,
        documents,
        metadatas,
        distances,
    } = batch;
    let (ids, documents, metadatas, distances) = (
        first_batch(ids),
        first_batch(documents),
        first_batch(metadatas),
        first_batch(distances),
    );

    let aligned = ids
        .len()
        .min(documents.len())
        .min(metadatas.len())
        .min(distances.len());
    if aligned < ids.len().max(distances.len()) {
        debug!(collection, aligned, "Ragged query response truncated");
    }

    ids.into_iter()
        .zip(documents)
        .zip(metadatas)
        .zip(distances)
        .take(aligned)
        .filter_map(|(((id, document), metadata), distance)| {
            let metadata: Metadata = metadata
                .unwrap_or_default()
                .iter()
                .map(|(k, v)| (k.clone(), MetadataValue::from_json(v)))
                .collect();
            let source = ["source", "filename"]
                .iter()
                .filter_map(|key| metadata.get(*key))
                .map(|v| v.to_string())
                .find(|s| !s.is_empty())
                .unwrap_or_default();

            match EvidenceRecord::new(id, document.unwrap_or_default()) {
                Ok(record) => Some(RetrievedRecord {
                    collection: collection.to_string(),
                    distance,
                    record: record
                        .with_metadata(metadata)
                        .with_source(source)
                        .with_relevance(distance),
                }),
                Err(e) => {
                    warn!(collection, error = %e, "Skipping unusable retrieval hit");
                    None
                }
            }
        })
        .collect()
}

fn first_batch<T>(lists: Vec<Vec<T>>) -> Vec<T> {
    lists.into_iter().next().unwrap_or_default()
}

/// Stable sort by ascending distance, keep the first of each id, cap.
fn rank_and_dedup(mut hits: Vec<RetrievedRecord>, max_total_results: usize) -> Vec<RetrievedRecord> {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut seen = HashSet::new();
    let mut ranked = Vec::new();
    for hit in hits {
        if ranked.len() >= max_total_results {
            break;
        }
        if seen.insert(hit.record.id().to_string()) {
            ranked.push(hit);
        }
    }
    ranked
}

/// Output of [`format_evidence_with_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEvidence {
    pub text: String,
    /// Chunk ids of the blocks that fit, in rendered order.
    pub record_ids: Vec<String>,
}

/// Render retrieved records as numbered evidence blocks with provenance.
///
/// Same greedy, block-atomic budget as the context builder: each record is
/// `[EVIDENCE i] collection=.. chunk_id=.. distance=..[ source=..]` plus its
/// truncated body, and the first block that does not fit ends the output.
pub fn format_evidence(
    records: &[RetrievedRecord],
    max_total_chars: usize,
    max_chunk_chars: usize,
) -> String {
    format_evidence_with_stats(records, max_total_chars, max_chunk_chars).text
}

/// Like [`format_evidence`], also reporting which records were emitted.
pub fn format_evidence_with_stats(
    records: &[RetrievedRecord],
    max_total_chars: usize,
    max_chunk_chars: usize,
) -> RenderedEvidence {
    let mut writer = BlockWriter::new(max_total_chars);
    let mut record_ids = Vec::new();

    for (index, hit) in records.iter().enumerate() {
        let mut block = format!(
            "[EVIDENCE {}] collection={} chunk_id={} distance={:.4}",
            index + 1,
            hit.collection,
            hit.record.id(),
            hit.distance
        );
        if let Some(source) = hit.record.effective_source() {
            block.push_str(&format!(" source={source}"));
        }
        block.push('\n');
        block.push_str(&truncate_text(hit.record.text(), max_chunk_chars));
        block.push_str("\n\n");

        if !writer.push(&block) {
            break;
        }
        record_ids.push(hit.record.id().to_string());
    }

    RenderedEvidence {
        text: writer.finish(),
        record_ids,
    }
}
