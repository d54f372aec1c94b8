//! Model service adapters for evidex.
//!
//! Both adapters implement the `evidex_core` capability traits:
//! `OllamaGenerator` is a `Generator`, `OllamaEmbedder` an `Embedder`.

pub mod ollama;

pub use ollama::{OllamaEmbedder, OllamaGenerator};
