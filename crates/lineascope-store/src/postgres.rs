//! PostgreSQL metadata store
//!
//! Persists the fact relations in a PostgreSQL database and serves
//! discovery queries from information_schema. Works with:
//! - PostgreSQL 9.4+
//! - Amazon Redshift
//! - CockroachDB
//! - Other PostgreSQL-compatible databases
//!
//! ## Authentication
//!
//! The adapter supports multiple connection methods:
//! 1. Direct credential authentication
//! 2. Connection string (PostgreSQL URL format)
//! 3. TLS/SSL connections via native-tls
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Using direct credentials
//! let store = PostgresStore::connect(
//!     "localhost",
//!     5432,
//!     "warehouse",
//!     "username",
//!     "password"
//! ).await?;
//!
//! // Using connection string
//! let store = PostgresStore::from_connection_string(
//!     "host=localhost port=5432 dbname=warehouse user=username password=password"
//! ).await?;
//! ```
//!
//! Requires the `postgres` Cargo feature; without it every constructor
//! returns [`StoreError::Config`].

use lineascope_core::{ColumnLineage, FactSet, Identifier, MetadataNamespace};

use crate::adapter::{ColumnInfo, MetadataStore, Row, StoreError, TableRef};

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Config as PgConfig, NoTls};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

#[cfg(feature = "postgres")]
use tokio::sync::Mutex;

/// Schema assumed for unqualified table references
#[cfg(feature = "postgres")]
const DEFAULT_SCHEMA: &str = "public";

#[cfg(not(feature = "postgres"))]
fn not_compiled() -> StoreError {
    StoreError::Config(
        "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres"
            .to_string(),
    )
}

/// PostgreSQL [`MetadataStore`] adapter
///
/// The client sits behind a mutex because rebuilds need exclusive access
/// for their transaction; reads take the same lock for the duration of
/// one query, which scopes connection use per call.
pub struct PostgresStore {
    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Mutex<Client>,

    /// Connection host
    host: String,

    /// Connection port
    port: u16,

    /// Database name
    database: String,

    /// Placeholder for when the feature is disabled
    #[cfg(not(feature = "postgres"))]
    _phantom: std::marker::PhantomData<()>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with direct credentials
    ///
    /// For TLS connections, use `connect_with_tls` instead.
    #[cfg(feature = "postgres")]
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let host = host.into();
        let database = database.into();
        let user = user.into();
        let password = password.into();

        let config = format!(
            "host={} port={} dbname={} user={} password={}",
            host, port, database, user, password
        );

        let (client, connection) =
            tokio_postgres::connect(&config, NoTls)
                .await
                .map_err(|e| {
                    StoreError::Connection(format!(
                        "Failed to connect to PostgreSQL at {}:{}: {}",
                        host, port, e
                    ))
                })?;

        // Drive the connection in the background
        let host_clone = host.clone();
        let port_clone = port;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    "PostgreSQL connection error ({}:{}): {}",
                    host_clone,
                    port_clone,
                    e
                );
            }
        });

        Ok(Self {
            client: Mutex::new(client),
            host,
            port,
            database,
        })
    }

    /// Create store without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Err(not_compiled())
    }

    /// Create a PostgreSQL store over a TLS connection
    #[cfg(feature = "postgres")]
    pub async fn connect_with_tls(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let host = host.into();
        let database = database.into();
        let user = user.into();
        let password = password.into();

        let config = format!(
            "host={} port={} dbname={} user={} password={}",
            host, port, database, user, password
        );

        let connector = TlsConnector::builder().build().map_err(|e| {
            StoreError::Config(format!("Failed to create TLS connector: {}", e))
        })?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(&config, tls).await.map_err(|e| {
            StoreError::Connection(format!(
                "Failed to connect to PostgreSQL at {}:{} with TLS: {}",
                host, port, e
            ))
        })?;

        let host_clone = host.clone();
        let port_clone = port;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    "PostgreSQL TLS connection error ({}:{}): {}",
                    host_clone,
                    port_clone,
                    e
                );
            }
        });

        Ok(Self {
            client: Mutex::new(client),
            host,
            port,
            database,
        })
    }

    /// Create store without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect_with_tls(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Err(not_compiled())
    }

    /// Create a store from a PostgreSQL connection string
    ///
    /// Supports the standard format:
    /// `host=localhost port=5432 dbname=warehouse user=postgres password=secret`
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str) -> Result<Self, StoreError> {
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| StoreError::Config(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.get_ports().first().copied().unwrap_or(5432);
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect: {}", e)))?;

        let host_clone = host.clone();
        let port_clone = port;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    "PostgreSQL connection error ({}:{}): {}",
                    host_clone,
                    port_clone,
                    e
                );
            }
        });

        Ok(Self {
            client: Mutex::new(client),
            host,
            port,
            database,
        })
    }

    /// Create store without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str) -> Result<Self, StoreError> {
        Err(not_compiled())
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the connection port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Split a table identifier into `(schema, name)`, defaulting the
    /// schema for unqualified references
    #[cfg(feature = "postgres")]
    fn split(table: &Identifier) -> (&str, &str) {
        (table.schema_part().unwrap_or(DEFAULT_SCHEMA), table.name())
    }

    /// Classify a driver error, recognizing missing relations
    #[cfg(feature = "postgres")]
    fn classify(context: &str, err: tokio_postgres::Error) -> StoreError {
        let text = err.to_string();
        if text.contains("does not exist") {
            StoreError::TableNotFound(context.to_string())
        } else {
            StoreError::Query(text)
        }
    }

    /// Quote a column name fetched from information_schema
    #[cfg(feature = "postgres")]
    fn quote(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[async_trait::async_trait]
impl MetadataStore for PostgresStore {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| StoreError::Connection(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn rebuild(
        &self,
        namespace: &MetadataNamespace,
        facts: &FactSet,
    ) -> Result<(), StoreError> {
        let schema = namespace
            .schema_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let table_lineage = namespace
            .table_lineage_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let column_lineage = namespace
            .column_lineage_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        // Dropping `tx` on any early return rolls the whole unit back.
        tx.batch_execute(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};\n\
             DROP TABLE IF EXISTS {table_lineage};\n\
             CREATE TABLE {table_lineage} (\n\
                 target_table TEXT, source_table TEXT, sql_text TEXT\n\
             );\n\
             DROP TABLE IF EXISTS {column_lineage};\n\
             CREATE TABLE {column_lineage} (\n\
                 target_table TEXT, target_column TEXT,\n\
                 source_table TEXT, source_column TEXT,\n\
                 transformation_logic TEXT, sql_file_name TEXT\n\
             );"
        ))
        .await
        .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let insert_table = tx
            .prepare(&format!(
                "INSERT INTO {table_lineage} VALUES ($1, $2, $3)"
            ))
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        for fact in &facts.table_lineage {
            tx.execute(
                &insert_table,
                &[&fact.target_table, &fact.source_table, &fact.sql_text],
            )
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        }

        let insert_column = tx
            .prepare(&format!(
                "INSERT INTO {column_lineage} VALUES ($1, $2, $3, $4, $5, $6)"
            ))
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        for fact in &facts.column_lineage {
            let origin = fact.origin.as_str();
            tx.execute(
                &insert_column,
                &[
                    &fact.target_table,
                    &fact.target_column,
                    &fact.source_tables,
                    &origin,
                    &fact.transformation_logic,
                    &fact.sql_file_name,
                ],
            )
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    #[cfg(not(feature = "postgres"))]
    async fn rebuild(
        &self,
        _namespace: &MetadataNamespace,
        _facts: &FactSet,
    ) -> Result<(), StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn list_schemas(&self) -> Result<Vec<String>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT DISTINCT table_schema
                 FROM information_schema.tables
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
                 ORDER BY table_schema",
                &[],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    #[cfg(not(feature = "postgres"))]
    async fn list_schemas(&self) -> Result<Vec<String>, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn list_tables(&self, schema: Option<&Identifier>) -> Result<Vec<TableRef>, StoreError> {
        let client = self.client.lock().await;
        let rows = match schema {
            Some(filter) => {
                let filter = filter.as_str();
                client
                    .query(
                        "SELECT table_schema, table_name
                         FROM information_schema.tables
                         WHERE table_schema = $1
                         ORDER BY table_name",
                        &[&filter],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        "SELECT table_schema, table_name
                         FROM information_schema.tables
                         WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
                         ORDER BY table_schema, table_name",
                        &[],
                    )
                    .await
            }
        }
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| TableRef::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    #[cfg(not(feature = "postgres"))]
    async fn list_tables(&self, _schema: Option<&Identifier>) -> Result<Vec<TableRef>, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn schema_exists(&self, schema: &Identifier) -> Result<bool, StoreError> {
        let client = self.client.lock().await;
        let name = schema.as_str();
        let rows = client
            .query(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
                &[&name],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(!rows.is_empty())
    }

    #[cfg(not(feature = "postgres"))]
    async fn schema_exists(&self, _schema: &Identifier) -> Result<bool, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError> {
        let (schema, name) = Self::split(table);
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT 1 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_name = $2",
                &[&schema, &name],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(!rows.is_empty())
    }

    #[cfg(not(feature = "postgres"))]
    async fn table_exists(&self, _table: &Identifier) -> Result<bool, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn describe_columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        let (schema, name) = Self::split(table);
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT column_name, data_type
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if rows.is_empty() {
            return Err(StoreError::TableNotFound(format!("{schema}.{name}")));
        }

        Ok(rows
            .iter()
            .map(|row| ColumnInfo::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    #[cfg(not(feature = "postgres"))]
    async fn describe_columns(&self, _table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn count_rows(&self, table: &Identifier) -> Result<u64, StoreError> {
        // `table` is validated, so interpolation is safe here.
        let client = self.client.lock().await;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {table}"), &[])
            .await
            .map_err(|e| Self::classify(table.as_str(), e))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    #[cfg(not(feature = "postgres"))]
    async fn count_rows(&self, _table: &Identifier) -> Result<u64, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn fetch_row(
        &self,
        table: &Identifier,
        key_column: &Identifier,
        key_value: &str,
    ) -> Result<Option<Row>, StoreError> {
        let columns = self.describe_columns(table).await?;
        if !columns.iter().any(|c| c.name == key_column.as_str()) {
            return Err(StoreError::Query(format!(
                "column '{}' does not exist in {}",
                key_column, table
            )));
        }

        // Cast every column to text so one string-typed parameter query
        // serves any key type.
        let select_list = columns
            .iter()
            .map(|c| format!("{}::text", Self::quote(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {select_list} FROM {table} WHERE {key}::text = $1 LIMIT 1",
            key = Self::quote(key_column.as_str()),
        );

        let client = self.client.lock().await;
        let rows = client
            .query(&query, &[&key_value])
            .await
            .map_err(|e| Self::classify(table.as_str(), e))?;

        Ok(rows.first().map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let value: Option<String> = row.get(index);
                    (column.name.clone(), value.unwrap_or_default())
                })
                .collect::<Row>()
        }))
    }

    #[cfg(not(feature = "postgres"))]
    async fn fetch_row(
        &self,
        _table: &Identifier,
        _key_column: &Identifier,
        _key_value: &str,
    ) -> Result<Option<Row>, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn upstream_tables(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
    ) -> Result<Vec<String>, StoreError> {
        let table_lineage = namespace
            .table_lineage_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let target = target.as_str();

        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!(
                    "SELECT DISTINCT source_table FROM {table_lineage}
                     WHERE target_table = $1
                     ORDER BY source_table"
                ),
                &[&target],
            )
            .await
            .map_err(|e| Self::classify(&namespace.table_lineage_ref(), e))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    #[cfg(not(feature = "postgres"))]
    async fn upstream_tables(
        &self,
        _namespace: &MetadataNamespace,
        _target: &Identifier,
    ) -> Result<Vec<String>, StoreError> {
        Err(not_compiled())
    }

    #[cfg(feature = "postgres")]
    async fn find_column_lineage(
        &self,
        namespace: &MetadataNamespace,
        target: &Identifier,
        column: &Identifier,
    ) -> Result<Option<ColumnLineage>, StoreError> {
        let column_lineage = namespace
            .column_lineage_ident()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let target_name = target.as_str();
        let column_name = column.as_str();

        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!(
                    "SELECT source_table, source_column, transformation_logic, sql_file_name
                     FROM {column_lineage}
                     WHERE target_table = $1 AND target_column = $2
                     LIMIT 1"
                ),
                &[&target_name, &column_name],
            )
            .await
            .map_err(|e| Self::classify(&namespace.column_lineage_ref(), e))?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let origin: String = row.get(1);
        let origin = origin
            .parse()
            .map_err(|e: lineascope_core::UnknownOrigin| StoreError::Query(e.to_string()))?;

        Ok(Some(ColumnLineage {
            target_table: target_name.to_string(),
            target_column: column_name.to_string(),
            source_tables: row.get(0),
            origin,
            transformation_logic: row.get(2),
            sql_file_name: row.get(3),
        }))
    }

    #[cfg(not(feature = "postgres"))]
    async fn find_column_lineage(
        &self,
        _namespace: &MetadataNamespace,
        _target: &Identifier,
        _column: &Identifier,
    ) -> Result<Option<ColumnLineage>, StoreError> {
        Err(not_compiled())
    }
}

#[cfg(all(test, not(feature = "postgres")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constructors_fail_without_feature() {
        let result = PostgresStore::connect("localhost", 5432, "db", "user", "pass").await;
        assert!(matches!(result, Err(StoreError::Config(_))));

        let result = PostgresStore::from_connection_string("host=localhost dbname=db").await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
