//! Budget estimation and usage reporting for rendered evidence context.
//!
//! Turns a model name into a usable character budget (via a table of known
//! context windows, a chars-per-token ratio, and a safety margin), and
//! measures how much of that budget a rendered context or prompt consumes.

pub mod budget;
pub mod token;
pub mod usage;
pub mod windows;

pub use budget::BudgetEstimator;
pub use token::{DEFAULT_CHARS_PER_TOKEN, DEFAULT_SAFETY, estimate_tokens};
pub use usage::{UsageAnalyzer, UsageStats};
pub use windows::ModelWindowTable;
