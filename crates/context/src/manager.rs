//! Run-scoped context accumulation.
//!
//! A [`ContextManager`] owns the state of one pipeline run: the set of record
//! ids already handed to the renderer and the ordered history of rendered
//! blocks. It is:
//!
//! - **Monotonic**: `seen_ids` only grows and `history` is append-only
//! - **Duplicate-free**: delta calls never render an id seen earlier in the run
//! - **Run-scoped**: nothing is persisted; drop the manager when the run ends

use crate::builder::render_with_stats;
use chrono::Utc;
use evidex_core::{BudgetConfig, EventBus, EvidenceRecord, RunEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Incremental, duplicate-free evidence context for one run.
#[derive(Default)]
pub struct ContextManager {
    seen_ids: HashSet<String>,
    history: Vec<String>,
    rendered: Vec<String>,
    events: Option<Arc<EventBus>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a [`RunEvent::ContextAppended`] for every appended block.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Seed the run with its first batch of evidence.
    ///
    /// Every id is marked seen and every record is rendered; no filtering
    /// happens here, even for ids marked by an earlier call.
    pub fn add_initial_context(
        &mut self,
        records: &[EvidenceRecord],
        config: &BudgetConfig,
        title: &str,
    ) -> String {
        for record in records {
            self.seen_ids.insert(record.id().to_string());
        }
        let rendered = render_with_stats(records, config, title);
        self.append(title, rendered.record_ids, rendered.text)
    }

    /// Render only records whose ids have not been seen in this run.
    ///
    /// Retained ids are marked seen as they are encountered, so a duplicate
    /// within `records` is kept once. When nothing is new, a
    /// `(no new evidence)` block is recorded instead.
    pub fn add_delta_context(
        &mut self,
        records: &[EvidenceRecord],
        config: &BudgetConfig,
        title: &str,
    ) -> String {
        let fresh: Vec<EvidenceRecord> = records
            .iter()
            .filter(|record| self.seen_ids.insert(record.id().to_string()))
            .cloned()
            .collect();

        debug!(
            title,
            offered = records.len(),
            fresh = fresh.len(),
            "Delta context filtered"
        );

        if fresh.is_empty() {
            let block = format!("=== {title} ===\n(no new evidence)\n");
            return self.append(title, Vec::new(), block);
        }

        let rendered = render_with_stats(&fresh, config, title);
        self.append(title, rendered.record_ids, rendered.text)
    }

    /// All non-empty blocks in emission order, separated by blank lines.
    pub fn full_context(&self) -> String {
        self.history
            .iter()
            .filter(|block| !block.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }

    pub fn seen_ids(&self) -> &HashSet<String> {
        &self.seen_ids
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Ids that made it into a block, in emission order.
    ///
    /// Smaller than `seen_ids` when a budget dropped records.
    pub fn rendered_ids(&self) -> &[String] {
        &self.rendered
    }

    fn append(&mut self, title: &str, record_ids: Vec<String>, block: String) -> String {
        if let Some(events) = &self.events {
            events.publish(RunEvent::ContextAppended {
                title: title.to_string(),
                records: record_ids.len(),
                chars: block.chars().count(),
                timestamp: Utc::now(),
            });
        }
        self.rendered.extend(record_ids);
        self.history.push(block.clone());
        block
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("seen_ids", &self.seen_ids.len())
            .field("history", &self.history.len())
            .field("rendered", &self.rendered.len())
            .finish()
    }
}
