//! Single-shot pipeline: every chunk file, one context, one generation.

use crate::generation::generate;
use crate::prompt::{SINGLE_SHOT_TEMPLATE, render_template};
use crate::report::{RunReport, Task};
use chrono::Utc;
use evidex_context::{ContextManager, load_records};
use evidex_core::error::ContextError;
use evidex_core::{BudgetConfig, ContextOrdering, EventBus, EvidenceRecord, Generator, Result};
use evidex_telemetry::UsageAnalyzer;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const SINGLE_SHOT_TITLE: &str = "IN-LEARNING CONTEXT (SINGLE-SHOT)";

/// Builds one budgeted context from all sources and calls the generator once.
pub struct SingleShotPipeline {
    generator: Arc<dyn Generator>,
    analyzer: UsageAnalyzer,
    budget: BudgetConfig,
    widen_from_model: bool,
    temperature: f32,
    template: String,
    events: Option<Arc<EventBus>>,
}

impl SingleShotPipeline {
    pub fn new(generator: Arc<dyn Generator>, analyzer: UsageAnalyzer) -> Self {
        Self {
            generator,
            analyzer,
            budget: BudgetConfig {
                max_total_chars: 140_000,
                max_chunk_count: 120,
                ..BudgetConfig::default()
            }
            .with_ordering(ContextOrdering::ByPageThenId),
            widen_from_model: true,
            temperature: 0.2,
            template: SINGLE_SHOT_TEMPLATE.to_string(),
            events: None,
        }
    }

    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// Replace the budget's total and chunk count with the model window's
    /// when the model is known (on by default).
    pub fn with_widening(mut self, widen: bool) -> Self {
        self.widen_from_model = widen;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// The budget a run will use for the configured model.
    pub fn effective_budget(&self) -> BudgetConfig {
        if !self.widen_from_model {
            return self.budget.clone();
        }
        self.analyzer
            .estimator()
            .fit_to_model(self.generator.model(), &self.budget)
            .unwrap_or_else(|| self.budget.clone())
    }

    pub async fn run(&self, task: &Task, files: &[PathBuf]) -> Result<RunReport> {
        let started_at = Utc::now();
        let records = load_records(files)?;
        if records.is_empty() {
            return Err(ContextError::EmptyCorpus { files: files.len() }.into());
        }

        let budget = self.effective_budget();
        let mut manager = ContextManager::new();
        if let Some(events) = &self.events {
            manager = manager.with_events(events.clone());
        }
        let context = manager.add_initial_context(&records, &budget, SINGLE_SHOT_TITLE);
        info!(
            files = files.len(),
            records = records.len(),
            rendered = manager.rendered_ids().len(),
            max_total_chars = budget.max_total_chars,
            "Single-shot context built"
        );

        let mut values = task.values();
        values.insert("CONTEXT".into(), context.clone());
        values.insert("INPUT_TEXT".into(), context.clone());
        let prompt = render_template(&self.template, &values, true)?;

        let (output, llm_duration_ms) = generate(
            self.generator.as_ref(),
            &prompt,
            self.temperature,
            self.events.as_deref(),
        )
        .await?;

        let shown = rendered_records(&records, manager.rendered_ids());
        let usage = self
            .analyzer
            .analyze(self.generator.model(), &context, Some(&shown), None);

        Ok(RunReport {
            pipeline: "single_shot".into(),
            model: self.generator.model().to_string(),
            root_feature: task.root_feature.clone(),
            domain: task.domain.clone(),
            sources: files.iter().map(|p| p.display().to_string()).collect(),
            records_total: records.len(),
            context,
            prompt,
            output,
            query: None,
            usage,
            iterations: Vec::new(),
            llm_duration_ms,
            started_at,
        })
    }
}

/// The records whose ids appear in `ids`, first occurrence only.
pub fn rendered_records(records: &[EvidenceRecord], ids: &[String]) -> Vec<EvidenceRecord> {
    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut taken = HashSet::new();
    records
        .iter()
        .filter(|r| wanted.contains(r.id()) && taken.insert(r.id()))
        .cloned()
        .collect()
}
