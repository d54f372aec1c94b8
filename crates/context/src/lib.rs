//! Evidence context construction for evidex.
//!
//! - [`builder`] renders an ordered list of records into one bounded text
//!   block (greedy, block-atomic, deterministic).
//! - [`manager`] wraps the builder with run-scoped state so iterative
//!   pipelines never render the same record id twice.
//! - [`sources`] loads and normalizes `*.chunks.json` files produced by
//!   ingestion.

pub mod builder;
pub mod manager;
pub mod sources;

pub use builder::{BlockWriter, Rendered, TRUNCATION_MARKER, render, render_with_stats, truncate_text};
pub use manager::ContextManager;
pub use sources::{
    CHUNK_FILE_SUFFIX, ChunkDocument, list_chunk_files, load_chunk_document, load_records, records_from_document,
};
