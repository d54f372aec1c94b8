//! Built-in context-window table for common local and hosted models.
//!
//! Windows are in tokens. Lookups are exact on the model name as it is sent
//! to the generator (`llama3.1:8b`, not `llama3.1`). Custom windows can be
//! added at runtime from the `budget.model_windows` config table.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Thread-safe model → context-window table with built-in defaults and
/// custom overrides.
pub struct ModelWindowTable {
    windows: RwLock<HashMap<String, usize>>,
}

impl ModelWindowTable {
    /// Create a table with built-in model windows.
    pub fn with_defaults() -> Self {
        let mut windows = HashMap::new();

        // ── Meta ───────────────────────────────────────────────────
        windows.insert("llama3.1:8b".into(), 131_072);
        windows.insert("llama3.1:70b".into(), 131_072);
        windows.insert("llama3.2:3b".into(), 131_072);
        windows.insert("llama3.3:70b".into(), 131_072);
        windows.insert("llama3:8b".into(), 8_192);

        // ── Mistral ────────────────────────────────────────────────
        windows.insert("mistral:7b".into(), 32_768);
        windows.insert("mistral-nemo:12b".into(), 131_072);
        windows.insert("mixtral:8x7b".into(), 32_768);

        // ── Qwen ───────────────────────────────────────────────────
        windows.insert("qwen2.5:7b".into(), 32_768);
        windows.insert("qwen2.5:14b".into(), 32_768);
        windows.insert("qwen2.5:32b".into(), 32_768);
        windows.insert("qwen3:8b".into(), 40_960);

        // ── Google ─────────────────────────────────────────────────
        windows.insert("gemma2:9b".into(), 8_192);
        windows.insert("gemma3:12b".into(), 131_072);

        // ── Microsoft / DeepSeek ───────────────────────────────────
        windows.insert("phi3:mini".into(), 4_096);
        windows.insert("phi4:14b".into(), 16_384);
        windows.insert("deepseek-r1:8b".into(), 131_072);

        // ── OpenAI open-weight (local and cloud-routed) ────────────
        windows.insert("gpt-oss:20b".into(), 131_072);
        windows.insert("gpt-oss:120b".into(), 131_072);
        windows.insert("gpt-oss:20b-cloud".into(), 131_072);
        windows.insert("gpt-oss:120b-cloud".into(), 131_072);

        Self {
            windows: RwLock::new(windows),
        }
    }

    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the window for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<usize> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(model.trim()).copied()
    }

    /// Add or update the window for a model.
    pub fn set(&self, model: impl Into<String>, window_tokens: usize) {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows.insert(model.into(), window_tokens);
    }

    /// Apply a batch of overrides (typically from config).
    pub fn extend<I, K>(&self, overrides: I)
    where
        I: IntoIterator<Item = (K, usize)>,
        K: Into<String>,
    {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        for (model, tokens) in overrides {
            windows.insert(model.into(), tokens);
        }
    }

    /// List all known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = windows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the table.
    pub fn len(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModelWindowTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ModelWindowTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelWindowTable")
            .field("models", &self.len())
            .finish()
    }
}
