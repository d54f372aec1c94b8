//! Iterative pipeline: one generation per chunk file.
//!
//! The first file seeds the run's [`ContextManager`]; each later file only
//! contributes records the run has not shown yet. Every prompt carries the
//! previous output so the model refines rather than restarts.

use crate::generation::generate;
use crate::prompt::{ITERATIVE_INITIAL_TEMPLATE, ITERATIVE_TEMPLATE, render_template};
use crate::report::{IterationReport, RunReport, Task};
use crate::single_shot::rendered_records;
use chrono::Utc;
use evidex_context::{ContextManager, load_records};
use evidex_core::error::ContextError;
use evidex_core::{BudgetConfig, ContextOrdering, EventBus, Generator, Result};
use evidex_telemetry::UsageAnalyzer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Placeholder for the previous output on the first iteration.
pub const EMPTY_PREVIOUS_OUTPUT: &str = "(empty)";

pub struct IterativePipeline {
    generator: Arc<dyn Generator>,
    analyzer: UsageAnalyzer,
    budget: BudgetConfig,
    temperature: f32,
    initial_template: String,
    template: String,
    events: Option<Arc<EventBus>>,
}

impl IterativePipeline {
    pub fn new(generator: Arc<dyn Generator>, analyzer: UsageAnalyzer) -> Self {
        Self {
            generator,
            analyzer,
            budget: BudgetConfig {
                max_total_chars: 50_000,
                max_chunk_count: 50,
                ..BudgetConfig::default()
            }
            .with_ordering(ContextOrdering::ByPageThenId),
            temperature: 0.2,
            initial_template: ITERATIVE_INITIAL_TEMPLATE.to_string(),
            template: ITERATIVE_TEMPLATE.to_string(),
            events: None,
        }
    }

    /// Budget applied to each delta block.
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Templates for the first iteration and for every later one.
    pub fn with_templates(mut self, initial: impl Into<String>, iterative: impl Into<String>) -> Self {
        self.initial_template = initial.into();
        self.template = iterative.into();
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, task: &Task, files: &[PathBuf]) -> Result<RunReport> {
        if files.is_empty() {
            return Err(ContextError::EmptyCorpus { files: 0 }.into());
        }
        let started_at = Utc::now();
        let mut manager = ContextManager::new();
        if let Some(events) = &self.events {
            manager = manager.with_events(events.clone());
        }

        let mut all_records = Vec::new();
        let mut iterations = Vec::with_capacity(files.len());
        let mut previous = String::new();
        let mut prompt = String::new();

        for (i, file) in files.iter().enumerate() {
            let index = i + 1;
            let records = load_records(std::slice::from_ref(file))?;
            let name = file_label(file);
            let title = format!("IN-LINE CONTEXT ADDITION (iter={index}, source={name})");

            let before = manager.rendered_ids().len();
            let delta = if index == 1 {
                manager.add_initial_context(&records, &self.budget, &title)
            } else {
                manager.add_delta_context(&records, &self.budget, &title)
            };
            let fresh_records = manager.rendered_ids().len() - before;

            let mut values = task.values();
            let shown_previous = match previous.trim() {
                "" => EMPTY_PREVIOUS_OUTPUT.to_string(),
                text => text.to_string(),
            };
            values.insert("PREVIOUS_OUTPUT".into(), shown_previous.clone());
            values.insert("PREVIOUS_FM_XML".into(), shown_previous);
            values.insert("DELTA_CONTEXT".into(), delta.clone());
            values.insert("INPUT_TEXT".into(), delta.clone());
            values.insert("ITERATION".into(), index.to_string());
            values.insert("SOURCE".into(), name.clone());

            let template = if index == 1 {
                &self.initial_template
            } else {
                &self.template
            };
            prompt = render_template(template, &values, true)?;

            info!(iteration = index, total = files.len(), source = %name, fresh_records, "Iteration started");
            let (output, duration_ms) = generate(
                self.generator.as_ref(),
                &prompt,
                self.temperature,
                self.events.as_deref(),
            )
            .await?;

            iterations.push(IterationReport {
                index,
                source: file.display().to_string(),
                fresh_records,
                delta,
                prompt: prompt.clone(),
                output: output.clone(),
                duration_ms,
            });
            previous = output;
            all_records.extend(records);
        }

        let context = manager.full_context();
        let shown = rendered_records(&all_records, manager.rendered_ids());
        let usage = self
            .analyzer
            .analyze(self.generator.model(), &context, Some(&shown), None);

        Ok(RunReport {
            pipeline: "iterative".into(),
            model: self.generator.model().to_string(),
            root_feature: task.root_feature.clone(),
            domain: task.domain.clone(),
            sources: files.iter().map(|p| p.display().to_string()).collect(),
            records_total: all_records.len(),
            context,
            prompt,
            output: previous,
            query: None,
            usage,
            llm_duration_ms: iterations.iter().map(|it| it.duration_ms).sum(),
            iterations,
            started_at,
        })
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
