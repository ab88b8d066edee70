//! Lineascope engine - lineage queries over the metadata store
//!
//! This crate implements the two halves of the system around the store
//! seam:
//! - [`MetadataBuilder`] runs a build pass: scan a script directory,
//!   extract lineage facts, and commit them transactionally.
//! - [`TraceEngine`] answers lineage questions (upstream tables, column
//!   traces, dependency trees, source health) from the persisted facts,
//!   never from the scripts themselves.

pub mod builder;
pub mod cache;
pub mod engine;
pub mod error;
pub mod report;
pub mod tree;

pub use builder::{BuildSummary, MetadataBuilder};
pub use cache::TraceCache;
pub use engine::TraceEngine;
pub use error::EngineError;
pub use report::{RowLookup, SourceCheck, SourceHealthReport, SourceStatus, TraceOutcome};
pub use tree::LineageTree;
