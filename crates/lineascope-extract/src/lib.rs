//! Lineage extraction from transformation scripts
//!
//! This crate recovers table- and column-level lineage facts from SQL
//! script text by pattern scanning, not grammar parsing. It deliberately
//! trades correctness on complex statements (subqueries, CTEs, nested
//! CASE, string literals containing keywords) for simplicity; the
//! limitations are documented on the individual patterns.

pub mod clean;
pub mod extractor;

pub use clean::SqlCleaner;
pub use extractor::LineageExtractor;
