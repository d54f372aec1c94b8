//! # evidex core
//!
//! Domain types, capability traits, and error definitions shared by every
//! evidex crate. Nothing here performs I/O: concrete embedders, vector
//! stores, and generators live in their own crates and implement the traits
//! defined in this one.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping a Chroma server for the in-memory store in tests
//! - Scripted generators and embedders in pipeline tests
//! - Clean dependency graph (all crates depend inward on core)

pub mod budget;
pub mod error;
pub mod event;
pub mod evidence;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use budget::{BudgetConfig, ContextOrdering};
pub use error::{Error, Result};
pub use event::{EventBus, RunEvent};
pub use evidence::{EvidenceRecord, Metadata, MetadataValue};
pub use provider::{Embedder, Generator};
pub use store::{QueryBatch, StoredChunk, VectorStore};
