//! In-memory metadata store
//!
//! A small relational catalog held behind a read/write lock. It backs the
//! engine's test suites and is usable for embedding without a database.
//! Rebuilds mutate the catalog under the write lock, so concurrent
//! readers always see either the pre-build or the post-build fact set,
//! never a partial replacement.
//!
//! Failure simulation mirrors the needs of the engine tests: a store can
//! be configured to fail connection tests, to fail rebuilds (leaving the
//! prior facts intact), or to fail reads against specific tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use lineascope_core::{ColumnLineage, FactSet, Identifier, MetadataNamespace};

use crate::adapter::{ColumnInfo, MetadataStore, Row, StoreError, TableRef};

/// Schema assumed for unqualified table references
const DEFAULT_SCHEMA: &str = "public";

/// One stored table: column definitions plus stringified rows
#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    /// schema name -> table name -> table
    schemas: BTreeMap<String, BTreeMap<String, MemoryTable>>,
}

impl Catalog {
    fn table(&self, schema: &str, name: &str) -> Option<&MemoryTable> {
        self.schemas.get(schema).and_then(|tables| tables.get(name))
    }
}

fn resolve(table: &Identifier) -> (&str, &str) {
    (
        table.schema_part().unwrap_or(DEFAULT_SCHEMA),
        table.name(),
    )
}

/// In-memory [`MetadataStore`] adapter
///
/// Clones share state, so a test can hold one handle for seeding and hand
/// another to the engine.
pub struct MemoryStore {
    catalog: Arc<RwLock<Catalog>>,

    /// Per-table read errors, keyed by qualified name
    errors: Arc<RwLock<HashMap<String, String>>>,

    /// Fail all connection tests
    fail_connection: bool,

    /// Fail rebuilds without touching the catalog
    fail_rebuild: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::default())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            fail_connection: false,
            fail_rebuild: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Seed a table with columns and rows
    pub async fn add_table(
        &self,
        schema: &str,
        name: &str,
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<String>>,
    ) {
        let mut catalog = self.catalog.write().await;
        catalog
            .schemas
            .entry(schema.to_string())
            .or_default()
            .insert(name.to_string(), MemoryTable { columns, rows });
    }

    /// Configure a read error for a specific table (qualified name)
    pub async fn inject_error(&self, table: &str, message: &str) {
        self.errors
            .write()
            .await
            .insert(table.to_string(), message.to_string());
    }

    /// Make subsequent rebuilds fail (or succeed again) without mutating
    /// the catalog
    pub fn set_fail_rebuild(&self, fail: bool) {
        self.fail_rebuild.store(fail, Ordering::SeqCst);
    }

    async fn injected_error(&self, qualified: &str) -> Option<StoreError> {
        self.errors
            .read()
            .await
            .get(qualified)
            .map(|message| StoreError::Query(message.clone()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            errors: Arc::clone(&self.errors),
            fail_connection: self.fail_connection,
            fail_rebuild: Arc::clone(&self.fail_rebuild),
        }
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryStore {
    fn name(&self) -> &'static str {
        "Memory"
    }

    async fn test_connection(&self) -> Result<(), StoreError> {
        if self.fail_connection {
            Err(StoreError::Connection(
                "simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn rebuild(
        &self,
        namespace: &MetadataNamespace,
        facts: &FactSet,
    ) -> Result<(), StoreError> {
        // Namespace names come from configuration; validate them the same
        // way a SQL-backed adapter must before interpolating.
        namespace
            .schema_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        if self.fail_rebuild.load(Ordering::SeqCst) {
            return Err(StoreError::Transaction(
                "simulated rebuild failure, prior facts preserved".to_string(),
            ));
        }

        let table_lineage = MemoryTable {
            columns: vec![
                ColumnInfo::new("target_table", "VARCHAR"),
                ColumnInfo::new("source_table", "VARCHAR"),
                ColumnInfo::new("sql_text", "VARCHAR"),
            ],
            rows: facts
                .table_lineage
                .iter()
                .map(|fact| {
                    vec![
                        fact.target_table.clone(),
                        fact.source_table.clone(),
                        fact.sql_text.clone(),
                    ]
                })
                .collect(),
        };

        let column_lineage = MemoryTable {
            columns: vec![
                ColumnInfo::new("target_table", "VARCHAR"),
                ColumnInfo::new("target_column", "VARCHAR"),
                ColumnInfo::new("source_table", "VARCHAR"),
                ColumnInfo::new("source_column", "VARCHAR"),
                ColumnInfo::new("transformation_logic", "VARCHAR"),
                ColumnInfo::new("sql_file_name", "VARCHAR"),
            ],
            rows: facts
                .column_lineage
                .iter()
                .map(|fact| {
                    vec![
                        fact.target_table.clone(),
                        fact.target_column.clone(),
                        fact.source_tables.clone(),
                        fact.origin.as_str().to_string(),
                        fact.transformation_logic.clone(),
                        fact.sql_file_name.clone(),
                    ]
                })
                .collect(),
        };

        // Holding the write lock for the whole replacement keeps the swap
        // atomic with respect to concurrent readers.
        let mut catalog = self.catalog.write().await;
        let schema = catalog
            .schemas
            .entry(namespace.schema.clone())
            .or_default();
        schema.insert(namespace.table_lineage.clone(), table_lineage);
        schema.insert(namespace.column_lineage.clone(), column_lineage);

        Ok(())
    }

    async fn list_schemas(&self) -> Result<Vec<String>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.schemas.keys().cloned().collect())
    }

    async fn list_tables(&self, schema: Option<&Identifier>) -> Result<Vec<TableRef>, StoreError> {
        let catalog = self.catalog.read().await;
        let mut tables = Vec::new();
        for (schema_name, schema_tables) in &catalog.schemas {
            if let Some(filter) = schema {
                if filter.as_str() != schema_name {
                    continue;
                }
            }
            for table_name in schema_tables.keys() {
                tables.push(TableRef::new(schema_name, table_name));
            }
        }
        Ok(tables)
    }

    async fn schema_exists(&self, schema: &Identifier) -> Result<bool, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.schemas.contains_key(schema.as_str()))
    }

    async fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError> {
        let (schema, name) = resolve(table);
        let catalog = self.catalog.read().await;
        Ok(catalog.table(schema, name).is_some())
    }

    async fn describe_columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        let (schema, name) = resolve(table);
        let qualified = format!("{schema}.{name}");
        if let Some(err) = self.injected_error(&qualified).await {
            return Err(err);
        }
        let catalog = self.catalog.read().await;
        catalog
            .table(schema, name)
            .map(|t| t.columns.clone())
            .ok_or(StoreError::TableNotFound(qualified))
    }

    async fn count_rows(&self, table: &Identifier) -> Result<u64, StoreError> {
        let (schema, name) = resolve(table);
        let qualified = format!("{schema}.{name}");
        if let Some(err) = self.injected_error(&qualified).await {
            return Err(err);
        }
        let catalog = self.catalog.read().await;
        catalog
            .table(schema, name)
            .map(|t| t.rows.len() as u64)
            .ok_or(StoreError::TableNotFound(qualified))
    }

    async fn fetch_row(
        &self,
        table: &Identifier,
        key_column: &Identifier,
        key_value: &str,
    ) -> Result<Option<Row>, StoreError> {
        let (schema, name) = resolve(table);
        let qualified = format!("{schema}.{name}");
        if let Some(err) = self.injected_error(&qualified).await {
            return Err(err);
        }
        let catalog = self.catalog.read().await;
        let stored = catalog
            .table(schema, name)
            .ok_or_else(|| StoreError::TableNotFound(qualified.clone()))?;

        let key_index = stored
            .columns
            .iter()
            .position(|c| c.name == key_column.as_str())
            .ok_or_else(|| {
                StoreError::Query(format!(
                    "column '{}' does not exist in {}",
                    key_column, qualified
                ))
            })?;

        let row = stored
            .rows
            .iter()
            .find(|row| row.get(key_index).map(String::as_str) == Some(key_value));

        Ok(row.map(|row| {
            stored
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), value.clone()))
                .collect::<Row>()
        }))
    }

    async fn upstream_tables(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
    ) -> Result<Vec<String>, StoreError> {
        let catalog = self.catalog.read().await;
        let stored = catalog
            .table(&namespace.schema, &namespace.table_lineage)
            .ok_or_else(|| StoreError::TableNotFound(namespace.table_lineage_ref()))?;

        let sources: BTreeSet<String> = stored
            .rows
            .iter()
            .filter(|row| row.first().map(String::as_str) == Some(target.as_str()))
            .filter_map(|row| row.get(1).cloned())
            .collect();

        Ok(sources.into_iter().collect())
    }

    async fn find_column_lineage(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
        column: &Identifier,
    ) -> Result<Option<ColumnLineage>, StoreError> {
        let catalog = self.catalog.read().await;
        let stored = catalog
            .table(&namespace.schema, &namespace.column_lineage)
            .ok_or_else(|| StoreError::TableNotFound(namespace.column_lineage_ref()))?;

        for row in &stored.rows {
            if row.first().map(String::as_str) != Some(target.as_str())
                || row.get(1).map(String::as_str) != Some(column.as_str())
            {
                continue;
            }
            let origin = row
                .get(3)
                .cloned()
                .unwrap_or_default()
                .parse()
                .map_err(|e: lineascope_core::UnknownOrigin| StoreError::Query(e.to_string()))?;
            return Ok(Some(ColumnLineage {
                target_table: target.as_str().to_string(),
                target_column: column.as_str().to_string(),
                source_tables: row.get(2).cloned().unwrap_or_default(),
                origin,
                transformation_logic: row.get(4).cloned().unwrap_or_default(),
                sql_file_name: row.get(5).cloned().unwrap_or_default(),
            }));
        }

        Ok(None)
    }
}
