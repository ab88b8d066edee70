//! Metadata store trait: the seam between extraction and querying

use std::collections::BTreeMap;
use std::fmt;

use lineascope_core::{ColumnLineage, FactSet, Identifier, MetadataNamespace};
use serde::{Deserialize, Serialize};

/// A column name/type pair returned by describe operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Store-native type string (passed through verbatim)
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A schema-qualified table reference returned by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name
    pub schema: String,

    /// Table name
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Get qualified name
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// A single row as a field map with stringified values
///
/// Ordered by field name so rendered output is deterministic.
pub type Row = BTreeMap<String, String>;

/// Errors raised by store adapters
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Trait for stores that persist and serve lineage metadata
///
/// All table/column/schema arguments are pre-validated [`Identifier`]
/// values; raw caller text can never reach generated query text through
/// this interface. Fact reads take the [`MetadataNamespace`] naming the
/// two fact relations.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Get the adapter name (e.g., "PostgreSQL", "Memory")
    fn name(&self) -> &'static str;

    /// Test the connection to the backing store
    async fn test_connection(&self) -> Result<(), StoreError>;

    /// Atomically replace the persisted fact set
    ///
    /// One transactional unit: drop and recreate both fact relations, bulk
    /// insert every fact, commit. On any failure the prior fact set must
    /// remain intact and the causing error is returned. Concurrent readers
    /// must never observe a partially-replaced set.
    async fn rebuild(&self, namespace: &MetadataNamespace, facts: &FactSet)
        -> Result<(), StoreError>;

    /// List user schemas, ordered by name
    async fn list_schemas(&self) -> Result<Vec<String>, StoreError>;

    /// List tables, optionally filtered to one schema
    async fn list_tables(&self, schema: Option<&Identifier>) -> Result<Vec<TableRef>, StoreError>;

    /// Whether a schema exists
    async fn schema_exists(&self, schema: &Identifier) -> Result<bool, StoreError>;

    /// Whether a table exists
    async fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError>;

    /// Column names and types for a table
    async fn describe_columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError>;

    /// Row count for a table
    async fn count_rows(&self, table: &Identifier) -> Result<u64, StoreError>;

    /// Fetch the first row where `key_column` equals `key_value`
    ///
    /// The key value is passed as a query parameter, never interpolated.
    async fn fetch_row(
        &self,
        table: &Identifier,
        key_column: &Identifier,
        key_value: &str,
    ) -> Result<Option<Row>, StoreError>;

    /// Distinct source tables recorded for `target`, ordered by name
    ///
    /// Fails with [`StoreError::TableNotFound`] when the table-lineage
    /// relation has not been built.
    async fn upstream_tables(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
    ) -> Result<Vec<String>, StoreError>;

    /// The column-lineage fact for `(target, column)`, if one was recorded
    ///
    /// Fails with [`StoreError::TableNotFound`] when the column-lineage
    /// relation has not been built.
    async fn find_column_lineage(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
        column: &Identifier,
    ) -> Result<Option<ColumnLineage>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_qualified_name() {
        let table = TableRef::new("raw", "employees");
        assert_eq!(table.qualified(), "raw.employees");
        assert_eq!(table.to_string(), "raw.employees");
    }
}
