//! Subcommand implementations and the wiring they share.

pub mod budget;
pub mod config_cmd;
pub mod context;
pub mod doctor;
pub mod index;
pub mod init;
pub mod retrieve;
pub mod run;
pub mod usage;

use clap::{Args, Subcommand, ValueEnum};
use evidex_config::AppConfig;
use evidex_context::list_chunk_files;
use evidex_core::error::{ContextError, EmbeddingError, ProviderError, StoreError};
use evidex_core::{ContextOrdering, Embedder, Generator, VectorStore};
use evidex_providers::{OllamaEmbedder, OllamaGenerator};
use evidex_retrieval::{ChromaStore, CollectionMode, InMemoryStore};
use evidex_telemetry::{BudgetEstimator, ModelWindowTable, UsageAnalyzer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ── Arguments ─────────────────────────────────────────────────────────────

#[derive(Args)]
pub struct ContextArgs {
    /// Chunk files to render (defaults to every file in the chunks directory)
    pub files: Vec<PathBuf>,

    /// Directory holding `*.chunks.json` files
    #[arg(long)]
    pub chunks_dir: Option<PathBuf>,

    /// Render these files as delta blocks after the initial one
    #[arg(long)]
    pub delta: Vec<PathBuf>,

    #[arg(long, allow_negative_numbers = true)]
    pub max_total_chars: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub max_chunk_chars: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub max_chunks: Option<i64>,

    /// as_is, by_id or by_page_then_id
    #[arg(long)]
    pub order: Option<ContextOrdering>,

    /// Include each record's metadata in its header
    #[arg(long)]
    pub metadata: bool,

    /// Omit the per-chunk header lines
    #[arg(long)]
    pub no_headers: bool,

    /// Block title
    #[arg(long, default_value = "IN-LEARNING CONTEXT")]
    pub title: String,

    /// Model used for the usage summary
    #[arg(short, long)]
    pub model: Option<String>,

    /// Write the context here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct IndexArgs {
    /// Chunk files to index (defaults to every file in the chunks directory)
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub chunks_dir: Option<PathBuf>,

    /// `per_source` or `one_collection:<name>`
    #[arg(long)]
    pub mode: Option<CollectionMode>,

    /// Prefix for per-source collection names
    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args)]
pub struct RetrieveArgs {
    #[arg(long)]
    pub root_feature: String,

    #[arg(long)]
    pub domain: String,

    /// Collections to query (defaults to every collection in the store)
    #[arg(long, value_delimiter = ',')]
    pub collections: Vec<String>,

    #[arg(long)]
    pub per_collection_limit: Option<usize>,

    #[arg(long)]
    pub max_total_results: Option<usize>,

    #[arg(long)]
    pub max_total_chars: Option<usize>,

    #[arg(long)]
    pub max_chunk_chars: Option<usize>,

    /// Query template with {{ROOT_FEATURE}} / {{DOMAIN}} placeholders
    #[arg(long)]
    pub query_template: Option<String>,

    /// Extra query placeholder, `KEY=VALUE` (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Print the ranked records as JSON
    #[arg(long)]
    pub json: bool,
}

/// Options common to every pipeline run.
#[derive(Args)]
pub struct TaskArgs {
    #[arg(long)]
    pub root_feature: String,

    #[arg(long)]
    pub domain: String,

    /// LLM model (defaults to the configured one)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Prompt template file
    #[arg(long)]
    pub prompt: Option<PathBuf>,

    /// Extra prompt placeholder, `KEY=VALUE` (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Artifact directory (defaults to data.output_dir)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct CorpusArgs {
    /// Chunk files (defaults to every file in the chunks directory)
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub chunks_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// One budgeted context from every chunk file, one generation
    SingleShot {
        #[command(flatten)]
        task: TaskArgs,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Keep the configured budget even when the model window is known
        #[arg(long)]
        no_widen: bool,
    },

    /// One generation per chunk file, refining the previous output
    Iterative {
        #[command(flatten)]
        task: TaskArgs,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Prompt template for iterations after the first
        #[arg(long)]
        next_prompt: Option<PathBuf>,
    },

    /// Generate from evidence retrieved out of a vector store
    Rag {
        #[command(flatten)]
        task: TaskArgs,

        /// Collections to query (defaults to every collection in the store)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,

        /// One retrieval and generation per collection
        #[arg(long)]
        iterative: bool,

        /// Prompt template for iterative steps after the first
        #[arg(long, requires = "iterative")]
        next_prompt: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = StoreKind::Chroma)]
        store: StoreKind,

        /// Index the chunk files before retrieving
        #[arg(long)]
        index: bool,

        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Chroma over HTTP
    Chroma,
    /// Process-local store, empty until `--index`
    Memory,
}

// ── Wiring ────────────────────────────────────────────────────────────────

/// Model windows from the built-in table plus `budget.model_windows`.
pub fn estimator(config: &AppConfig) -> BudgetEstimator {
    let windows = ModelWindowTable::with_defaults();
    windows.extend(
        config
            .budget
            .model_windows
            .iter()
            .map(|(model, tokens)| (model.clone(), *tokens)),
    );
    BudgetEstimator::new(windows)
        .with_ratio(config.budget.chars_per_token, config.budget.safety)
        .with_avg_chunk_chars(config.budget.avg_chunk_chars)
}

pub fn analyzer(config: &AppConfig) -> UsageAnalyzer {
    UsageAnalyzer::new(estimator(config))
}

pub fn generator(config: &AppConfig, model: Option<&str>) -> Result<Arc<dyn Generator>, ProviderError> {
    let mut ollama = config.services.ollama.clone();
    if let Some(model) = model {
        ollama.llm_model = model.to_string();
    }
    Ok(Arc::new(OllamaGenerator::from_config(&ollama)?))
}

pub fn embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    Ok(Arc::new(OllamaEmbedder::from_config(&config.services.ollama)?))
}

pub fn chroma(config: &AppConfig) -> Result<ChromaStore, StoreError> {
    let chroma = &config.services.chroma;
    Ok(
        ChromaStore::new(&chroma.host, chroma.port, Duration::from_secs(chroma.timeout_secs))?
            .with_tenant(&chroma.tenant, &chroma.database),
    )
}

pub fn store(config: &AppConfig, kind: StoreKind) -> Result<Arc<dyn VectorStore>, StoreError> {
    let store: Arc<dyn VectorStore> = match kind {
        StoreKind::Chroma => Arc::new(chroma(config)?),
        StoreKind::Memory => Arc::new(InMemoryStore::new()),
    };
    Ok(store)
}

/// Explicit files win; otherwise every chunk file under the directory.
pub fn chunk_files(
    config: &AppConfig,
    files: &[PathBuf],
    dir: Option<&PathBuf>,
) -> Result<Vec<PathBuf>, ContextError> {
    if !files.is_empty() {
        return Ok(files.to_vec());
    }
    list_chunk_files(dir.unwrap_or(&config.data.chunks_dir))
}

/// The configured collection mode, e.g. `one_collection:evidex_all`.
pub fn collection_mode(config: &AppConfig) -> Result<CollectionMode, String> {
    config.vectorization.mode_spec().parse()
}

pub fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
