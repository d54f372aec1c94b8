//! End-to-end tests for the evidex pipelines.
//!
//! These run chunk files through loading, budgeting, indexing, retrieval and
//! generation with scripted model stand-ins, the same wiring the CLI uses.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use evidex_config::AppConfig;
use evidex_core::error::{EmbeddingError, ProviderError};
use evidex_core::{Embedder, EventBus, Generator, RunEvent, VectorStore};
use evidex_pipeline::{
    EvidenceLimits, IterativePipeline, RetrievalPipeline, SingleShotPipeline, Task,
};
use evidex_retrieval::{CollectionMode, InMemoryStore, Indexer, RetrievalService};
use evidex_telemetry::{BudgetEstimator, ModelWindowTable, UsageAnalyzer};
use serde_json::json;

// ── Stand-ins ────────────────────────────────────────────────────────────

/// Replays canned outputs in order and keeps every prompt.
struct ScriptedGenerator {
    outputs: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: Mutex::new(outputs.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Generator for ScriptedGenerator {
    fn model(&self) -> &str {
        "e2e:stub"
    }

    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("no scripted output left".into()))
    }
}

/// Embeds by keyword presence so nearest-neighbour order is predictable.
struct KeywordEmbedder;

#[async_trait::async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                let has = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
                vec![has("cache"), has("editor"), 0.1]
            })
            .collect())
    }
}

fn write_chunks(dir: &Path, source: &str, chunks: &[(&str, i64, &str)]) -> PathBuf {
    let entries: Vec<_> = chunks
        .iter()
        .map(|(id, page, text)| {
            json!({ "chunk_id": id, "text": text, "metadata": { "page_number": page } })
        })
        .collect();
    let path = dir.join(format!("{source}.chunks.json"));
    std::fs::write(&path, json!({ "source": source, "chunks": entries }).to_string()).unwrap();
    path
}

fn corpus(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_chunks(
            dir,
            "caching.pdf",
            &[
                ("cache-2", 2, "Cache eviction uses LRU ordering."),
                ("cache-1", 1, "A cache layer sits in front of storage."),
            ],
        ),
        write_chunks(
            dir,
            "editor.pdf",
            &[
                ("editor-1", 1, "The editor renders a document tree."),
                ("cache-1", 1, "A cache layer sits in front of storage."),
            ],
        ),
    ]
}

fn analyzer(windows: &[(&str, usize)]) -> UsageAnalyzer {
    let table = ModelWindowTable::empty();
    table.extend(windows.iter().map(|(m, t)| (m.to_string(), *t)));
    UsageAnalyzer::new(BudgetEstimator::new(table))
}

// ── Chunk-file pipelines ─────────────────────────────────────────────────

#[tokio::test]
async fn single_shot_renders_all_sources_in_page_order() {
    let dir = tempfile::tempdir().unwrap();
    let files = corpus(dir.path());
    let generator = Arc::new(ScriptedGenerator::new(&["<featureModel/>"]));

    let report = SingleShotPipeline::new(generator.clone(), analyzer(&[("e2e:stub", 8_192)]))
        .run(&Task::new("Cache", "storage"), &files)
        .await
        .unwrap();

    assert_eq!(report.pipeline, "single_shot");
    assert_eq!(report.output, "<featureModel/>");
    assert_eq!(report.records_total, 4);
    // the initial block renders its input as given; usage counts distinct ids
    assert_eq!(report.context.matches("id=cache-1").count(), 2);
    assert_eq!(report.usage.chunk_count, 3);
    assert_eq!(report.usage.source_count, 2);
    assert!(report.usage.max_chars > 0);

    let page_one = report.context.find("id=editor-1").unwrap();
    let page_two = report.context.find("id=cache-2").unwrap();
    assert!(page_one < page_two);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("ROOT FEATURE: Cache"));
    assert!(prompts[0].contains("DOMAIN: storage"));
}

#[tokio::test]
async fn iterative_never_repeats_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let files = corpus(dir.path());
    let generator = Arc::new(ScriptedGenerator::new(&["<v1/>", "<v2/>"]));

    let report = IterativePipeline::new(generator.clone(), analyzer(&[]))
        .run(&Task::new("Cache", "storage"), &files)
        .await
        .unwrap();

    assert_eq!(report.output, "<v2/>");
    assert_eq!(report.iterations.len(), 2);
    assert_eq!(report.iterations[0].fresh_records, 2);
    assert_eq!(report.iterations[1].fresh_records, 1);
    assert!(!report.iterations[1].delta.contains("id=cache-1"));
    assert_eq!(report.context.matches("id=cache-1").count(), 1);

    let prompts = generator.prompts();
    assert!(prompts[1].contains("<v1/>"));
    assert!(prompts[1].contains("id=editor-1"));
    // unknown model: no window, no utilization
    assert_eq!(report.usage.max_chars, 0);
    assert_eq!(report.usage.char_utilization, 0.0);
}

// ── Index + retrieval ────────────────────────────────────────────────────

async fn indexed_store(files: &[PathBuf], mode: &CollectionMode) -> Arc<dyn VectorStore> {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
    let report = Indexer::new(store.clone(), Arc::new(KeywordEmbedder))
        .with_batch_size(1)
        .with_embed_model("keyword")
        .index_files(files, mode)
        .await
        .unwrap();
    assert_eq!(report.files, files.len());
    assert_eq!(report.failed(), 0);
    store
}

#[tokio::test]
async fn rag_retrieves_the_nearest_evidence_first() {
    let dir = tempfile::tempdir().unwrap();
    let files = corpus(dir.path());
    let mode = CollectionMode::OneCollection("evidex_all".into());
    let store = indexed_store(&files, &mode).await;
    assert_eq!(store.collections().await.unwrap(), vec!["evidex_all"]);

    let generator = Arc::new(ScriptedGenerator::new(&["<rag/>"]));
    let service = RetrievalService::new(store, Arc::new(KeywordEmbedder));
    let report = RetrievalPipeline::new(service, generator.clone(), analyzer(&[]))
        .with_limits(EvidenceLimits {
            per_collection_limit: 10,
            max_total_results: 2,
            ..EvidenceLimits::default()
        })
        .run_single(&Task::new("Cache", "storage"), &mode.collections_for(&files, ""))
        .await
        .unwrap();

    assert_eq!(report.pipeline, "rag");
    assert_eq!(report.output, "<rag/>");
    assert_eq!(report.records_total, 2);
    assert!(report.query.as_deref().unwrap().starts_with("(Cache AND storage)"));
    assert!(report.context.contains("A cache layer"));
    assert!(!report.context.contains("document tree"));
    assert!(generator.prompts()[0].contains(&report.context));
}

#[tokio::test]
async fn rag_iterative_walks_per_source_collections() {
    let dir = tempfile::tempdir().unwrap();
    let files = corpus(dir.path());
    let store = indexed_store(&files, &CollectionMode::PerSource).await;
    let collections = CollectionMode::PerSource.collections_for(&files, "");
    assert_eq!(collections, vec!["caching_pdf", "editor_pdf"]);

    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let generator = Arc::new(ScriptedGenerator::new(&["<s1/>", "<s2/>"]));
    let service = RetrievalService::new(store, Arc::new(KeywordEmbedder)).with_events(bus.clone());
    let report = RetrievalPipeline::new(service, generator.clone(), analyzer(&[]))
        .with_events(bus.clone())
        .run_iterative(&Task::new("Cache", "storage"), &collections)
        .await
        .unwrap();

    assert_eq!(report.pipeline, "rag_iterative");
    assert_eq!(report.output, "<s2/>");
    assert_eq!(report.iterations.len(), 2);
    // cache-1 came from the first collection; only editor-1 is new
    assert_eq!(report.iterations[1].fresh_records, 1);
    assert_eq!(report.context.matches("id=cache-1").count(), 1);
    assert!(generator.prompts()[1].contains("<s1/>"));

    let mut retrievals = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.as_ref(), RunEvent::RetrievalCompleted { .. }) {
            retrievals += 1;
        }
    }
    assert_eq!(retrievals, 2);
}

#[tokio::test]
async fn missing_collection_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let files = corpus(dir.path());
    let mode = CollectionMode::OneCollection("evidex_all".into());
    let store = indexed_store(&files, &mode).await;

    let generator = Arc::new(ScriptedGenerator::new(&["<ok/>"]));
    let service = RetrievalService::new(store, Arc::new(KeywordEmbedder));
    let report = RetrievalPipeline::new(service, generator, analyzer(&[]))
        .run_single(
            &Task::new("Cache", "storage"),
            &["nope".to_string(), "evidex_all".to_string()],
        )
        .await
        .unwrap();
    assert!(report.records_total > 0);
}

// ── Configuration ────────────────────────────────────────────────────────

#[test]
fn config_file_drives_pipeline_budgets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evidex.toml");
    std::fs::write(
        &path,
        r#"
[services.ollama]
llm_model = "house:7b"

[pipelines.single_shot.budget]
max_total_chars = 2000
max_chunk_count = 3

[budget.model_windows]
"house:7b" = 16000
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.services.ollama.llm_model, "house:7b");
    assert_eq!(config.pipelines.single_shot.budget.max_total_chars, 2000);
    assert_eq!(config.pipelines.single_shot.budget.max_chunk_chars, 6000);
    assert_eq!(config.budget.model_windows.get("house:7b"), Some(&16000));
}
