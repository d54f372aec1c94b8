//! Context usage reporting.
//!
//! Measures rendered context or prompt text against a model budget. Two
//! entry points: [`UsageAnalyzer::analyze`] when the originating records are
//! at hand, [`UsageAnalyzer::analyze_prompt`] when only the rendered prompt
//! is (chunk count and sources are recovered from its `[CHUNK n]` or
//! `[EVIDENCE n]` headers).

use crate::budget::BudgetEstimator;
use crate::token::{char_len, estimate_tokens};
use evidex_core::EvidenceRecord;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static CHUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[(?:CHUNK|EVIDENCE)\s+\d+\]").expect("valid chunk header pattern")
});

static SOURCE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsource=(\S+)").expect("valid source field pattern"));

/// Budget utilization of one rendered text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub model: String,
    pub total_chars: usize,
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    pub max_chars: usize,
    pub char_utilization: f64,
    pub token_utilization: f64,
    pub chunk_count: usize,
    pub source_count: usize,
    pub sources: Vec<String>,
}

/// Computes [`UsageStats`] with budgets resolved through a [`BudgetEstimator`].
#[derive(Debug, Default)]
pub struct UsageAnalyzer {
    estimator: BudgetEstimator,
}

impl UsageAnalyzer {
    pub fn new(estimator: BudgetEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &BudgetEstimator {
        &self.estimator
    }

    /// Analyze rendered context, optionally with the records it came from.
    ///
    /// Without `explicit_max_tokens` the budget comes from the model window
    /// table; an unknown model yields a zero budget and zero utilization.
    pub fn analyze(
        &self,
        model: &str,
        rendered_text: &str,
        records: Option<&[EvidenceRecord]>,
        explicit_max_tokens: Option<usize>,
    ) -> UsageStats {
        let mut stats = self.measure(model, rendered_text, explicit_max_tokens);
        if let Some(records) = records {
            let sources: BTreeSet<String> = records
                .iter()
                .filter_map(EvidenceRecord::effective_source)
                .map(str::to_string)
                .collect();
            stats.chunk_count = records.len();
            stats.source_count = sources.len();
            stats.sources = sources.into_iter().collect();
        }
        stats
    }

    /// Analyze a fully rendered prompt with no record list available.
    pub fn analyze_prompt(
        &self,
        model: &str,
        prompt_text: &str,
        explicit_max_tokens: Option<usize>,
    ) -> UsageStats {
        let mut stats = self.measure(model, prompt_text, explicit_max_tokens);
        let (chunk_count, sources) = extract_prompt_sources(prompt_text);
        stats.chunk_count = chunk_count;
        stats.source_count = sources.len();
        stats.sources = sources;
        stats
    }

    fn measure(&self, model: &str, text: &str, explicit_max_tokens: Option<usize>) -> UsageStats {
        let chars_per_token = self.estimator.chars_per_token();
        let total_chars = char_len(text);
        let estimated_tokens = estimate_tokens(text, chars_per_token);

        let (max_tokens, max_chars) = match explicit_max_tokens {
            Some(max_tokens) => (max_tokens, self.estimator.max_chars_for_tokens(max_tokens)),
            None => {
                let max_chars = self.estimator.max_chars_for_model(model);
                let max_tokens = if max_chars == 0 {
                    0
                } else {
                    (max_chars as f64 / chars_per_token) as usize
                };
                (max_tokens, max_chars)
            }
        };

        UsageStats {
            model: model.to_string(),
            total_chars,
            estimated_tokens,
            max_tokens,
            max_chars,
            char_utilization: ratio(total_chars, max_chars),
            token_utilization: ratio(estimated_tokens, max_tokens),
            chunk_count: 0,
            source_count: 0,
            sources: Vec::new(),
        }
    }
}

fn ratio(used: usize, budget: usize) -> f64 {
    if budget == 0 {
        0.0
    } else {
        used as f64 / budget as f64
    }
}

/// Count `[CHUNK n]` and `[EVIDENCE n]` header lines and collect distinct `source=` values.
pub fn extract_prompt_sources(prompt_text: &str) -> (usize, Vec<String>) {
    if prompt_text.is_empty() {
        return (0, Vec::new());
    }
    let chunk_count = CHUNK_HEADER.find_iter(prompt_text).count();
    let sources: BTreeSet<String> = SOURCE_FIELD
        .captures_iter(prompt_text)
        .map(|caps| caps[1].to_string())
        .collect();
    (chunk_count, sources.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::ModelWindowTable;

    fn analyzer() -> UsageAnalyzer {
        let table = ModelWindowTable::empty();
        table.set("m:1b", 1_000);
        UsageAnalyzer::new(BudgetEstimator::new(table))
    }

    #[test]
    fn unknown_model_reports_zero_utilization() {
        let stats = analyzer().analyze("mystery", "some text here", None, None);
        assert_eq!(stats.max_chars, 0);
        assert_eq!(stats.max_tokens, 0);
        assert_eq!(stats.char_utilization, 0.0);
        assert_eq!(stats.token_utilization, 0.0);
        assert_eq!(stats.total_chars, 14);
        assert_eq!(stats.estimated_tokens, 3);
    }

    #[test]
    fn known_model_budget() {
        let text = "a".repeat(800);
        let stats = analyzer().analyze("m:1b", &text, None, None);
        // 1000 * 4.0 * 0.8 = 3200 chars, 800 tokens
        assert_eq!(stats.max_chars, 3_200);
        assert_eq!(stats.max_tokens, 800);
        assert!((stats.char_utilization - 0.25).abs() < 1e-9);
        assert!((stats.token_utilization - 0.25).abs() < 1e-9);
    }

    #[test]
    fn explicit_max_tokens_wins() {
        let text = "a".repeat(400);
        let stats = analyzer().analyze("mystery", &text, None, Some(500));
        assert_eq!(stats.max_tokens, 500);
        assert_eq!(stats.max_chars, 1_600);
        assert!((stats.token_utilization - 0.2).abs() < 1e-9);
    }

    #[test]
    fn records_supply_chunks_and_sources() {
        let records = vec![
            EvidenceRecord::new("a", "x").unwrap().with_source("b.pdf"),
            EvidenceRecord::new("b", "y")
                .unwrap()
                .with_meta("source", "a.pdf"),
            EvidenceRecord::new("c", "z").unwrap().with_source("b.pdf"),
            EvidenceRecord::new("d", "w").unwrap(),
        ];
        let stats = analyzer().analyze("m:1b", "ctx", Some(&records), None);
        assert_eq!(stats.chunk_count, 4);
        assert_eq!(stats.source_count, 2);
        assert_eq!(stats.sources, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn prompt_headers_are_parsed() {
        let prompt = "Intro\n=== CONTEXT ===\n[CHUNK 1] id=a source=Article_1 page=2\nbody\n\n\
                      [CHUNK 2] id=b source=Article_2\nbody\n\n\
                      [CHUNK 3] id=c source=Article_1\nbody\n  [CHUNK 4] indented is ignored";
        let stats = analyzer().analyze_prompt("m:1b", prompt, None);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.sources, vec!["Article_1", "Article_2"]);
        assert_eq!(stats.source_count, 2);
    }

    #[test]
    fn retrieval_evidence_headers_are_parsed() {
        let prompt = "EVIDENCE:\n\
                      [EVIDENCE 1] collection=X chunk_id=a distance=0.1000 source=p.pdf\nbody\n\n\
                      [EVIDENCE 2] collection=Y chunk_id=b distance=0.2000 source=q.pdf\nbody";
        let stats = analyzer().analyze_prompt("m:1b", prompt, None);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.sources, vec!["p.pdf", "q.pdf"]);
    }

    #[test]
    fn empty_prompt_has_no_chunks() {
        assert_eq!(extract_prompt_sources(""), (0, Vec::new()));
    }
}
