//! What a pipeline run produced.

use chrono::{DateTime, Utc};
use evidex_telemetry::UsageStats;
use serde::Serialize;
use serde_json::{Value, json};

/// The topic a run generates a model for.
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub root_feature: String,
    pub domain: String,
    /// Extra template values (e.g. `HIGH_LEVEL_FEATURES`).
    pub extra: crate::prompt::PromptValues,
}

impl Task {
    pub fn new(root_feature: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            root_feature: root_feature.into(),
            domain: domain.into(),
            extra: Default::default(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Template values shared by every pipeline, extras first so the
    /// pipeline's own keys win.
    pub(crate) fn values(&self) -> crate::prompt::PromptValues {
        let mut values = self.extra.clone();
        values.insert("ROOT_FEATURE".into(), self.root_feature.clone());
        values.insert("DOMAIN".into(), self.domain.clone());
        values
    }
}

/// One LLM call inside an iterative run.
#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub index: usize,
    /// Chunk file or collection the delta came from
    pub source: String,
    pub fresh_records: usize,
    #[serde(skip)]
    pub delta: String,
    #[serde(skip)]
    pub prompt: String,
    #[serde(skip)]
    pub output: String,
    pub duration_ms: u64,
}

/// The outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// `single_shot`, `iterative`, `rag` or `rag_iterative`
    pub pipeline: String,
    pub model: String,
    pub root_feature: String,
    pub domain: String,
    /// Chunk files or collections, in processing order
    pub sources: Vec<String>,
    /// Records loaded or retrieved before budgeting
    pub records_total: usize,
    #[serde(skip)]
    pub context: String,
    #[serde(skip)]
    pub prompt: String,
    #[serde(skip)]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub usage: UsageStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<IterationReport>,
    /// Total time spent in the generator
    pub llm_duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl RunReport {
    /// Summary written next to the run's artifacts.
    pub fn meta(&self, run_id: &str) -> Value {
        let mut meta = json!({
            "run_id": run_id,
            "pipeline": self.pipeline,
            "root_feature": self.root_feature,
            "domain": self.domain,
            "llm_model": self.model,
            "num_sources": self.sources.len(),
            "sources": self.sources,
            "num_records_total": self.records_total,
            "num_records_rendered": self.usage.chunk_count,
            "context_chars": self.usage.total_chars,
            "prompt_chars": self.prompt.chars().count(),
            "output_chars": self.output.chars().count(),
            "llm_duration_ms": self.llm_duration_ms,
            "started_at": self.started_at.to_rfc3339(),
            "usage": self.usage,
        });
        if let Some(query) = &self.query {
            meta["query_used"] = json!(query);
        }
        if !self.iterations.is_empty() {
            meta["iterations"] = json!(self.iterations);
        }
        meta
    }
}
