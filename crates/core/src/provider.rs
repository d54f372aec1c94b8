//! Capability traits for the model services evidex talks to.
//!
//! A [`Generator`] turns a prompt into text; an [`Embedder`] turns text into
//! vectors. Core logic depends only on these traits.
//!
//! Implementations: Ollama (HTTP), scripted stubs in tests.

use crate::error::{EmbeddingError, ProviderError};
use async_trait::async_trait;

/// Text generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// The model name requests are sent to (used for budgets and artifact names).
    fn model(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ProviderError>;
}

/// Embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each input, returning exactly one vector per input.
    ///
    /// Blank inputs map to an empty vector.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
