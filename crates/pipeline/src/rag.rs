//! Retrieval-grounded pipelines.
//!
//! `run_single` retrieves once across every collection and renders the
//! merged evidence; `run_iterative` walks the collections one at a time and
//! routes each retrieval through a [`ContextManager`], so evidence shown in
//! an earlier step is never repeated.

use crate::generation::generate;
use crate::prompt::{ITERATIVE_INITIAL_TEMPLATE, ITERATIVE_TEMPLATE, RETRIEVAL_TEMPLATE, render_template};
use crate::report::{IterationReport, RunReport, Task};
use crate::single_shot::rendered_records;
use chrono::Utc;
use evidex_context::ContextManager;
use evidex_core::{BudgetConfig, ContextOrdering, EventBus, Generator, Result};
use evidex_retrieval::service::{
    DEFAULT_EVIDENCE_MAX_CHUNK_CHARS, DEFAULT_EVIDENCE_MAX_TOTAL_CHARS, DEFAULT_MAX_TOTAL_RESULTS,
    DEFAULT_PER_COLLECTION_LIMIT,
};
use evidex_retrieval::{DEFAULT_QUERY_TEMPLATE, RetrievalRequest, RetrievalService};
use evidex_telemetry::UsageAnalyzer;
use std::sync::Arc;
use tracing::info;

/// Retrieval and evidence-rendering limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceLimits {
    pub per_collection_limit: usize,
    pub max_total_results: usize,
    pub max_total_chars: usize,
    pub max_chunk_chars: usize,
}

impl Default for EvidenceLimits {
    fn default() -> Self {
        Self {
            per_collection_limit: DEFAULT_PER_COLLECTION_LIMIT,
            max_total_results: DEFAULT_MAX_TOTAL_RESULTS,
            max_total_chars: DEFAULT_EVIDENCE_MAX_TOTAL_CHARS,
            max_chunk_chars: DEFAULT_EVIDENCE_MAX_CHUNK_CHARS,
        }
    }
}

impl EvidenceLimits {
    /// Budget for delta blocks; retrieval order (by distance) is kept.
    fn delta_budget(&self) -> BudgetConfig {
        BudgetConfig {
            max_total_chars: self.max_total_chars,
            max_chunk_chars: self.max_chunk_chars,
            max_chunk_count: self.max_total_results,
            ..BudgetConfig::default()
        }
        .with_ordering(ContextOrdering::AsIs)
    }
}

pub struct RetrievalPipeline {
    service: RetrievalService,
    generator: Arc<dyn Generator>,
    analyzer: UsageAnalyzer,
    limits: EvidenceLimits,
    query_template: String,
    filter: Option<serde_json::Value>,
    temperature: f32,
    template: String,
    initial_template: String,
    iterative_template: String,
    events: Option<Arc<EventBus>>,
}

impl RetrievalPipeline {
    pub fn new(service: RetrievalService, generator: Arc<dyn Generator>, analyzer: UsageAnalyzer) -> Self {
        Self {
            service,
            generator,
            analyzer,
            limits: EvidenceLimits::default(),
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
            filter: None,
            temperature: 0.2,
            template: RETRIEVAL_TEMPLATE.to_string(),
            initial_template: ITERATIVE_INITIAL_TEMPLATE.to_string(),
            iterative_template: ITERATIVE_TEMPLATE.to_string(),
            events: None,
        }
    }

    pub fn with_limits(mut self, limits: EvidenceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }

    pub fn with_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Prompt template for `run_single`; must place `{{EVIDENCE}}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Templates for the first and later steps of `run_iterative`.
    pub fn with_iterative_templates(
        mut self,
        initial: impl Into<String>,
        iterative: impl Into<String>,
    ) -> Self {
        self.initial_template = initial.into();
        self.iterative_template = iterative.into();
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn request(&self, task: &Task, collections: Vec<String>) -> RetrievalRequest {
        let mut request = RetrievalRequest::new(&task.root_feature, &task.domain, collections)
            .with_template(&self.query_template)
            .with_limits(self.limits.per_collection_limit, self.limits.max_total_results);
        if let Some(filter) = &self.filter {
            request = request.with_filter(filter.clone());
        }
        for (key, value) in &task.extra {
            request = request.with_extra(key, value);
        }
        request
    }

    /// Retrieve once across `collections`, then generate once.
    pub async fn run_single(&self, task: &Task, collections: &[String]) -> Result<RunReport> {
        let started_at = Utc::now();
        let result = self.service.retrieve(&self.request(task, collections.to_vec())).await?;
        let rendered = self.service.to_prompt_evidence(
            &result,
            self.limits.max_total_chars,
            self.limits.max_chunk_chars,
        );
        let evidence = rendered.text;
        info!(
            collections = collections.len(),
            records = result.len(),
            shown = rendered.record_ids.len(),
            evidence_chars = evidence.chars().count(),
            "Evidence retrieved"
        );

        let mut values = task.values();
        values.insert("EVIDENCE".into(), evidence.clone());
        values.insert("CONTEXT".into(), evidence.clone());
        let prompt = render_template(&self.template, &values, true)?;

        let (output, llm_duration_ms) = generate(
            self.generator.as_ref(),
            &prompt,
            self.temperature,
            self.events.as_deref(),
        )
        .await?;

        let shown = rendered_records(&result.evidence_records(), &rendered.record_ids);
        let usage = self
            .analyzer
            .analyze(self.generator.model(), &evidence, Some(&shown), None);

        Ok(RunReport {
            pipeline: "rag".into(),
            model: self.generator.model().to_string(),
            root_feature: task.root_feature.clone(),
            domain: task.domain.clone(),
            sources: collections.to_vec(),
            records_total: result.len(),
            context: evidence,
            prompt,
            output,
            query: Some(result.query),
            usage,
            iterations: Vec::new(),
            llm_duration_ms,
            started_at,
        })
    }

    /// One retrieval and one generation per collection, evidence never repeated.
    pub async fn run_iterative(&self, task: &Task, collections: &[String]) -> Result<RunReport> {
        let started_at = Utc::now();
        let budget = self.limits.delta_budget();
        let mut manager = ContextManager::new();
        if let Some(events) = &self.events {
            manager = manager.with_events(events.clone());
        }

        let mut all_records = Vec::new();
        let mut iterations = Vec::with_capacity(collections.len());
        let mut previous = String::new();
        let mut prompt = String::new();
        let mut query = None;

        if collections.is_empty() {
            return Err(evidex_core::error::RetrievalError::NoCollections.into());
        }

        for (i, collection) in collections.iter().enumerate() {
            let index = i + 1;
            let result = self
                .service
                .retrieve(&self.request(task, vec![collection.clone()]))
                .await?;
            let records = result.evidence_records();
            query.get_or_insert_with(|| result.query.clone());

            let title = format!("RETRIEVED EVIDENCE (iter={index}, collection={collection})");
            let before = manager.rendered_ids().len();
            let delta = if index == 1 {
                manager.add_initial_context(&records, &budget, &title)
            } else {
                manager.add_delta_context(&records, &budget, &title)
            };
            let fresh_records = manager.rendered_ids().len() - before;

            let shown_previous = match previous.trim() {
                "" => crate::iterative::EMPTY_PREVIOUS_OUTPUT.to_string(),
                text => text.to_string(),
            };
            let mut values = task.values();
            values.insert("PREVIOUS_OUTPUT".into(), shown_previous);
            values.insert("DELTA_CONTEXT".into(), delta.clone());
            values.insert("EVIDENCE".into(), delta.clone());
            values.insert("ITERATION".into(), index.to_string());
            values.insert("SOURCE".into(), collection.clone());

            let template = if index == 1 {
                &self.initial_template
            } else {
                &self.iterative_template
            };
            prompt = render_template(template, &values, true)?;

            info!(iteration = index, collection = %collection, fresh_records, "Retrieval step");
            let (output, duration_ms) = generate(
                self.generator.as_ref(),
                &prompt,
                self.temperature,
                self.events.as_deref(),
            )
            .await?;

            iterations.push(IterationReport {
                index,
                source: collection.clone(),
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
            pipeline: "rag_iterative".into(),
            model: self.generator.model().to_string(),
            root_feature: task.root_feature.clone(),
            domain: task.domain.clone(),
            sources: collections.to_vec(),
            records_total: all_records.len(),
            context,
            prompt,
            output: previous,
            query,
            usage,
            llm_duration_ms: iterations.iter().map(|it| it.duration_ms).sum(),
            iterations,
            started_at,
        })
    }
}
