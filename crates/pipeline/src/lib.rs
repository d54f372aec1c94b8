//! Evidence-grounded generation pipelines.
//!
//! Each pipeline wires the core components together for one run shape:
//!
//! - [`SingleShotPipeline`]: all chunk files, one budgeted context, one call
//! - [`IterativePipeline`]: one call per chunk file over delta context
//! - [`RetrievalPipeline`]: vector-store evidence, single or per collection
//!
//! Pipelines return a [`RunReport`]; persisting it is the caller's job.

mod generation;
pub mod iterative;
pub mod prompt;
pub mod rag;
pub mod report;
pub mod single_shot;

#[cfg(test)]
pub(crate) mod testing;

pub use iterative::IterativePipeline;
pub use prompt::{PromptValues, load_template, model_slug, render_template};
pub use rag::{EvidenceLimits, RetrievalPipeline};
pub use report::{IterationReport, RunReport, Task};
pub use single_shot::{SingleShotPipeline, rendered_records};
