//! Metadata store adapters
//!
//! The trace engine never reads transformation scripts directly; the
//! persisted fact relations are the sole hand-off between extraction and
//! querying. This crate defines that seam as the [`MetadataStore`] trait
//! and provides two adapters:
//!
//! - [`MemoryStore`] — an in-memory catalog for tests and embedding.
//! - [`PostgresStore`] — a PostgreSQL-backed store, enabled via the
//!   `postgres` Cargo feature.

pub mod adapter;
pub mod memory;
pub mod postgres;

pub use adapter::{ColumnInfo, MetadataStore, Row, StoreError, TableRef};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
