//! Budget configuration for rendering evidence into a bounded text block.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How records are ordered before rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrdering {
    /// Preserve input order.
    #[default]
    #[serde(alias = "as-is")]
    AsIs,
    /// Lexical order on record id.
    #[serde(alias = "by-id")]
    ById,
    /// Integer page number (missing pages sort as 0), then id.
    #[serde(alias = "by-page-then-id")]
    ByPageThenId,
}

impl FromStr for ContextOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "as_is" => Ok(Self::AsIs),
            "by_id" => Ok(Self::ById),
            "by_page_then_id" => Ok(Self::ByPageThenId),
            other => Err(format!(
                "unknown ordering '{other}' (expected as_is, by_id or by_page_then_id)"
            )),
        }
    }
}

/// Limits and layout switches for one rendered block.
///
/// Negative limits cannot be represented; signed inputs (config files, CLI
/// flags) go through [`BudgetConfig::try_new`] or deserialization, both of
/// which reject them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBudget")]
pub struct BudgetConfig {
    pub max_total_chars: usize,
    pub max_chunk_chars: usize,
    pub max_chunk_count: usize,
    pub include_headers: bool,
    pub include_metadata: bool,
    pub ordering: ContextOrdering,
}

pub const DEFAULT_MAX_TOTAL_CHARS: usize = 120_000;
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 6_000;
pub const DEFAULT_MAX_CHUNK_COUNT: usize = 80;

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_chars: DEFAULT_MAX_TOTAL_CHARS,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
            include_headers: true,
            // metadata dumps bloat the prompt; opt in explicitly
            include_metadata: false,
            ordering: ContextOrdering::AsIs,
        }
    }
}

impl BudgetConfig {
    /// Build a budget from signed limits, rejecting negatives.
    pub fn try_new(
        max_total_chars: i64,
        max_chunk_chars: i64,
        max_chunk_count: i64,
    ) -> Result<Self, ContextError> {
        Ok(Self {
            max_total_chars: non_negative("max_total_chars", max_total_chars)?,
            max_chunk_chars: non_negative("max_chunk_chars", max_chunk_chars)?,
            max_chunk_count: non_negative("max_chunk_count", max_chunk_count)?,
            ..Self::default()
        })
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_ordering(mut self, ordering: ContextOrdering) -> Self {
        self.ordering = ordering;
        self
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<usize, ContextError> {
    usize::try_from(value).map_err(|_| ContextError::InvalidBudget { field, value })
}

/// Signed mirror of [`BudgetConfig`] used during deserialization.
#[derive(Deserialize)]
struct RawBudget {
    #[serde(default = "default_total")]
    max_total_chars: i64,
    #[serde(default = "default_chunk_chars")]
    max_chunk_chars: i64,
    #[serde(default = "default_chunk_count", alias = "max_chunks")]
    max_chunk_count: i64,
    #[serde(default = "default_true")]
    include_headers: bool,
    #[serde(default)]
    include_metadata: bool,
    #[serde(default)]
    ordering: ContextOrdering,
}

fn default_total() -> i64 {
    DEFAULT_MAX_TOTAL_CHARS as i64
}
fn default_chunk_chars() -> i64 {
    DEFAULT_MAX_CHUNK_CHARS as i64
}
fn default_chunk_count() -> i64 {
    DEFAULT_MAX_CHUNK_COUNT as i64
}
fn default_true() -> bool {
    true
}

impl TryFrom<RawBudget> for BudgetConfig {
    type Error = ContextError;

    fn try_from(raw: RawBudget) -> Result<Self, Self::Error> {
        Ok(
            Self::try_new(raw.max_total_chars, raw.max_chunk_chars, raw.max_chunk_count)?
                .with_headers(raw.include_headers)
                .with_metadata(raw.include_metadata)
                .with_ordering(raw.ordering),
        )
    }
}
