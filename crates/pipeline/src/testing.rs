//! Stubs shared by the pipeline tests.

use async_trait::async_trait;
use evidex_core::error::{EmbeddingError, ProviderError};
use evidex_core::{Embedder, Generator};
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Replays canned outputs and records every prompt it was given.
pub struct ScriptedGenerator {
    model: String,
    outputs: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(model: &str, outputs: &[&str]) -> Self {
        Self {
            model: model.into(),
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))
    }
}

/// Embeds every text as `[1.0, 0.0]`.
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Write `{source}.chunks.json` with `(id, page, text)` entries.
pub fn write_chunks(dir: &Path, source: &str, chunks: &[(&str, i64, &str)]) -> PathBuf {
    let entries: Vec<_> = chunks
        .iter()
        .map(|(id, page, text)| {
            json!({ "chunk_id": id, "text": text, "metadata": { "page_number": page } })
        })
        .collect();
    let path = dir.join(format!("{source}.chunks.json"));
    std::fs::write(
        &path,
        json!({ "source": source, "chunks": entries }).to_string(),
    )
    .unwrap();
    path
}
