//! Retrieval for evidex: query templating, multi-collection merge/rank/dedup,
//! and the vector stores it runs against.
//!
//! Stores:
//! - **InMemory** (default for tests): cosine distance over a `HashMap`
//! - **Chroma**: HTTP client for a Chroma server's v1 REST API
//!
//! The [`indexer`] fills either store from chunk source files.

pub mod chroma;
pub mod in_memory;
pub mod indexer;
pub mod query;
pub mod service;
pub mod vector;

pub use chroma::ChromaStore;
pub use in_memory::InMemoryStore;
pub use indexer::{CollectionMode, IndexReport, Indexer, collection_name_for};
pub use query::{DEFAULT_QUERY_TEMPLATE, build_query, clean_token};
pub use service::{
    RenderedEvidence, RetrievalRequest, RetrievalResult, RetrievalService, RetrievedRecord,
    format_evidence, format_evidence_with_stats,
};
