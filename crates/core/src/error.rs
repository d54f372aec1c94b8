//! Error types for the evidex domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Fatal errors that reach
//! the user are phrased as one sentence naming the missing resource and the
//! remedy.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all evidex operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Context errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Vector store errors ---
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(
        "No chunk files (*.chunks.json) found in {}; run ingestion first or point --chunks-dir at an ingested corpus",
        .dir.display()
    )]
    MissingChunks { dir: PathBuf },

    #[error("Chunk file {} is not usable: {reason}", .path.display())]
    InvalidChunkFile { path: PathBuf, reason: String },

    #[error(
        "Chunk files ({files} given) contain no usable records; check the ingestion output"
    )]
    EmptyCorpus { files: usize },

    #[error("Invalid evidence record: {0}")]
    InvalidRecord(String),

    #[error("Invalid budget: {field} must not be negative (got {value})")]
    InvalidBudget { field: &'static str, value: i64 },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Query against '{collection}' failed: {reason}")]
    QueryFailed { collection: String, reason: String },

    #[error("Upsert into '{collection}' failed: {reason}")]
    UpsertFailed { collection: String, reason: String },

    #[error("Vector store unreachable: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Embedding service returned an invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Embedding service returned no vector for a non-empty input")]
    Empty,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error(
        "LLM request timed out after {secs}s (host={host}, model={model}); retry later, use a closer host, or lower the input size"
    )]
    Timeout { host: String, model: String, secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Could not embed the retrieval query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("No collections were given to retrieve from")]
    NoCollections,
}

#[derive(Debug, Clone, Error)]
pub enum PromptError {
    #[error("Prompt still has unresolved placeholders: {}; fill every template variable", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),

    #[error("Prompt template not found at {}", .0.display())]
    TemplateNotFound(PathBuf),
}
