//! Model-aware character budgets.
//!
//! `usable_chars = window_tokens * chars_per_token * safety`, floored. An
//! unknown model has a budget of 0 and the caller substitutes its own
//! default.

use crate::token::{DEFAULT_CHARS_PER_TOKEN, DEFAULT_SAFETY};
use crate::windows::ModelWindowTable;
use evidex_core::BudgetConfig;
use tracing::debug;

/// Average rendered chunk size assumed when deriving a chunk-count cap.
pub const DEFAULT_AVG_CHUNK_CHARS: usize = 1_200;

/// Usable characters for `model_name`, or 0 if the model is not in `windows`.
pub fn max_chars_for_model(
    model_name: &str,
    windows: &ModelWindowTable,
    chars_per_token: f64,
    safety: f64,
) -> usize {
    match windows.get(model_name) {
        Some(window_tokens) => max_chars_for_tokens(window_tokens, chars_per_token, safety),
        None => 0,
    }
}

/// Usable characters for an explicit token window.
pub fn max_chars_for_tokens(max_tokens: usize, chars_per_token: f64, safety: f64) -> usize {
    if chars_per_token <= 0.0 || safety <= 0.0 {
        return 0;
    }
    (max_tokens as f64 * chars_per_token * safety) as usize
}

/// Chunk-count cap consistent with a character cap.
///
/// `max_total_chars / avg_chunk_chars_hint`, at least 1 for a non-zero
/// budget. A zero hint falls back to [`DEFAULT_AVG_CHUNK_CHARS`].
pub fn max_chunk_count(max_total_chars: usize, avg_chunk_chars_hint: usize) -> usize {
    if max_total_chars == 0 {
        return 0;
    }
    let avg = if avg_chunk_chars_hint == 0 {
        DEFAULT_AVG_CHUNK_CHARS
    } else {
        avg_chunk_chars_hint
    };
    (max_total_chars / avg).max(1)
}

/// Budget estimator bundling a window table with its conversion settings.
#[derive(Debug)]
pub struct BudgetEstimator {
    windows: ModelWindowTable,
    chars_per_token: f64,
    safety: f64,
    avg_chunk_chars: usize,
}

impl BudgetEstimator {
    pub fn new(windows: ModelWindowTable) -> Self {
        Self {
            windows,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            safety: DEFAULT_SAFETY,
            avg_chunk_chars: DEFAULT_AVG_CHUNK_CHARS,
        }
    }

    pub fn with_ratio(mut self, chars_per_token: f64, safety: f64) -> Self {
        self.chars_per_token = chars_per_token;
        self.safety = safety;
        self
    }

    pub fn with_avg_chunk_chars(mut self, avg_chunk_chars: usize) -> Self {
        self.avg_chunk_chars = avg_chunk_chars;
        self
    }

    pub fn windows(&self) -> &ModelWindowTable {
        &self.windows
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    pub fn safety(&self) -> f64 {
        self.safety
    }

    pub fn max_chars_for_model(&self, model_name: &str) -> usize {
        max_chars_for_model(model_name, &self.windows, self.chars_per_token, self.safety)
    }

    pub fn max_chars_for_tokens(&self, max_tokens: usize) -> usize {
        max_chars_for_tokens(max_tokens, self.chars_per_token, self.safety)
    }

    pub fn max_chunk_count(&self, max_total_chars: usize) -> usize {
        max_chunk_count(max_total_chars, self.avg_chunk_chars)
    }

    /// Resize `base` to the model's window when the model is known.
    ///
    /// Replaces `max_total_chars` and `max_chunk_count`; everything else is
    /// kept. Returns `None` for unknown models.
    pub fn fit_to_model(&self, model_name: &str, base: &BudgetConfig) -> Option<BudgetConfig> {
        let max_total_chars = self.max_chars_for_model(model_name);
        if max_total_chars == 0 {
            return None;
        }
        let max_chunk_count = self.max_chunk_count(max_total_chars);
        debug!(
            model = model_name,
            max_total_chars, max_chunk_count, "Context budget adjusted for model"
        );
        Some(BudgetConfig {
            max_total_chars,
            max_chunk_count,
            ..base.clone()
        })
    }
}

impl Default for BudgetEstimator {
    fn default() -> Self {
        Self::new(ModelWindowTable::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_returns_zero() {
        let table = ModelWindowTable::with_defaults();
        assert_eq!(max_chars_for_model("no-such-model", &table, 4.0, 0.8), 0);
    }

    #[test]
    fn known_model_applies_ratio_and_safety() {
        let table = ModelWindowTable::empty();
        table.set("m:1b", 10_000);
        // 10_000 * 4.0 * 0.8
        assert_eq!(max_chars_for_model("m:1b", &table, 4.0, 0.8), 32_000);
    }

    #[test]
    fn tokens_formula_floors() {
        assert_eq!(max_chars_for_tokens(3, 3.5, 0.9), 9);
        assert_eq!(max_chars_for_tokens(0, 4.0, 0.8), 0);
        assert_eq!(max_chars_for_tokens(100, 0.0, 0.8), 0);
    }

    #[test]
    fn chunk_count_heuristic() {
        assert_eq!(max_chunk_count(0, 1_200), 0);
        assert_eq!(max_chunk_count(500, 1_200), 1);
        assert_eq!(max_chunk_count(12_000, 1_200), 10);
        assert_eq!(max_chunk_count(12_000, 0), 10);
    }

    #[test]
    fn fit_to_model_replaces_limits_only() {
        let table = ModelWindowTable::empty();
        table.set("m:1b", 10_000);
        let estimator = BudgetEstimator::new(table).with_avg_chunk_chars(1_000);
        let base = BudgetConfig::default().with_metadata(true);

        let fitted = estimator.fit_to_model("m:1b", &base).unwrap();
        assert_eq!(fitted.max_total_chars, 32_000);
        assert_eq!(fitted.max_chunk_count, 32);
        assert_eq!(fitted.max_chunk_chars, base.max_chunk_chars);
        assert!(fitted.include_metadata);

        assert!(estimator.fit_to_model("other", &base).is_none());
    }

    #[test]
    fn custom_ratio_is_used() {
        let table = ModelWindowTable::empty();
        table.set("m:1b", 1_000);
        let estimator = BudgetEstimator::new(table).with_ratio(3.0, 0.5);
        assert_eq!(estimator.max_chars_for_model("m:1b"), 1_500);
        assert_eq!(estimator.max_chars_for_tokens(2_000), 3_000);
    }
}
