//! The lineage query engine
//!
//! Reads exclusively from the metadata store; the scripts a build pass
//! scanned are never consulted at query time. The engine keeps no graph
//! in memory between calls: every operation is a fresh store query plus
//! the bounded trace cache.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use lineascope_core::{Config, Identifier, MetadataNamespace};
use lineascope_store::{ColumnInfo, MetadataStore, Row, TableRef};

use crate::cache::TraceCache;
use crate::error::EngineError;
use crate::report::{RowLookup, SourceCheck, SourceHealthReport, TraceOutcome};
use crate::tree::LineageTree;

/// Depth bound used when a tree expansion does not specify one
const DEFAULT_MAX_DEPTH: usize = 5;

/// Lineage query engine over a [`MetadataStore`]
///
/// All operations take `&self`; concurrent read operations are safe. The
/// only shared mutable state is the trace cache, which synchronizes
/// internally.
pub struct TraceEngine {
    store: Arc<dyn MetadataStore>,
    namespace: MetadataNamespace,
    cache: TraceCache,
    default_max_depth: usize,
}

impl TraceEngine {
    /// Create an engine with default namespace, cache, and depth settings
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            namespace: MetadataNamespace::default(),
            cache: TraceCache::default(),
            default_max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Create an engine from configuration
    pub fn from_config(store: Arc<dyn MetadataStore>, config: &Config) -> Self {
        Self {
            store,
            namespace: config.metadata.clone(),
            cache: TraceCache::new(config.cache_capacity),
            default_max_depth: config.max_depth,
        }
    }

    /// Override the metadata namespace
    pub fn with_namespace(mut self, namespace: MetadataNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Override the trace cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TraceCache::new(capacity);
        self
    }

    /// Override the default tree depth bound
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.default_max_depth = depth;
        self
    }

    /// The configured metadata namespace
    pub fn namespace(&self) -> &MetadataNamespace {
        &self.namespace
    }

    /// Number of entries currently cached
    pub fn cached_traces(&self) -> usize {
        self.cache.len()
    }

    /// Drop all cached trace results
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("trace cache cleared");
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// List schemas in the backing store
    pub async fn list_schemas(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_schemas().await?)
    }

    /// List tables, optionally filtered to one schema
    pub async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableRef>, EngineError> {
        let filter = schema.map(Identifier::schema).transpose()?;
        Ok(self.store.list_tables(filter.as_ref()).await?)
    }

    /// Column names and types for a table
    pub async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        let table = Identifier::table(table)?;
        Ok(self.store.describe_columns(&table).await?)
    }

    /// Row count for a table
    pub async fn count_rows(&self, table: &str) -> Result<u64, EngineError> {
        let table = Identifier::table(table)?;
        Ok(self.store.count_rows(&table).await?)
    }

    /// Fetch one row by key column and value
    pub async fn inspect_row(
        &self,
        table: &str,
        key_column: &str,
        key_value: &str,
    ) -> Result<RowLookup, EngineError> {
        let table = Identifier::table(table)?;
        let key_column = Identifier::column(key_column)?;

        let row: Option<Row> = self.store.fetch_row(&table, &key_column, key_value).await?;
        Ok(match row {
            Some(row) => RowLookup::Found { row },
            None => RowLookup::NotFound {
                message: format!("no row where {key_column} = {key_value}"),
            },
        })
    }

    // ── Lineage ──────────────────────────────────────────────────────

    /// Tables that feed into `target`
    ///
    /// Empty when no facts exist for the target, which callers read as
    /// "source/leaf table, or metadata missing". Missing metadata is
    /// logged, not raised.
    pub async fn get_upstream_tables(&self, target: &str) -> Result<Vec<String>, EngineError> {
        let target = Identifier::table(target)?;

        let lineage_table = self.namespace.table_lineage_ident()?;
        if !self.store.table_exists(&lineage_table).await? {
            warn!(
                table = %self.namespace.table_lineage_ref(),
                "table-lineage metadata not built"
            );
            return Ok(Vec::new());
        }

        Ok(self.store.upstream_tables(&self.namespace, &target).await?)
    }

    /// Trace how a column is derived
    ///
    /// Results (including negative ones) are cached by `(target, column)`
    /// until [`TraceEngine::clear_cache`]; a rebuild does not invalidate
    /// them.
    pub async fn trace_column_lineage(
        &self,
        target: &str,
        column: &str,
    ) -> Result<TraceOutcome, EngineError> {
        let target_id = Identifier::table(target)?;
        let column_id = Identifier::column(column)?;

        if let Some(hit) = self.cache.get(target, column) {
            debug!(target, column, "trace served from cache");
            return Ok(hit);
        }

        let lineage_table = self.namespace.column_lineage_ident()?;
        let outcome = if !self.store.table_exists(&lineage_table).await? {
            TraceOutcome::MetadataMissing {
                table: self.namespace.column_lineage_ref(),
            }
        } else {
            match self
                .store
                .find_column_lineage(&self.namespace, &target_id, &column_id)
                .await?
            {
                Some(fact) => TraceOutcome::Found(fact),
                None => TraceOutcome::NotFound {
                    target: target.to_string(),
                    column: column.to_string(),
                },
            }
        };

        self.cache.insert(target, column, outcome.clone());
        Ok(outcome)
    }

    /// Expand the full upstream dependency tree of `target`
    ///
    /// Termination, in priority order: depth exhausted (`Truncated`), a
    /// table repeated along its own ancestry path (`Cycle`), no upstream
    /// facts (`Source`). Tables shared by several branches expand in each
    /// branch; only genuine back-edges are flagged as cycles.
    pub async fn get_lineage_tree(
        &self,
        target: &str,
        max_depth: Option<usize>,
    ) -> Result<LineageTree, EngineError> {
        Identifier::table(target)?;
        let depth = max_depth.unwrap_or(self.default_max_depth);
        let mut visited = HashSet::new();
        self.expand_tree(target.to_string(), depth, &mut visited)
            .await
    }

    fn expand_tree<'a>(
        &'a self,
        target: String,
        depth: usize,
        visited: &'a mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = Result<LineageTree, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            if depth == 0 {
                return Ok(LineageTree::Truncated);
            }

            let key = target.to_ascii_lowercase();
            if visited.contains(&key) {
                debug!(table = %target, "cycle detected in lineage metadata");
                return Ok(LineageTree::Cycle);
            }

            let upstream = match self.get_upstream_tables(&target).await {
                Ok(upstream) => upstream,
                // A malformed source name recorded in the metadata stops
                // this branch, not the whole expansion.
                Err(EngineError::InvalidIdentifier(err)) => {
                    warn!(%err, "malformed source name in metadata, treating as leaf");
                    return Ok(LineageTree::Source);
                }
                Err(other) => return Err(other),
            };

            if upstream.is_empty() {
                return Ok(LineageTree::Source);
            }

            visited.insert(key.clone());
            let mut children = BTreeMap::new();
            for source in upstream {
                let subtree = self.expand_tree(source.clone(), depth - 1, visited).await?;
                children.insert(source, subtree);
            }
            visited.remove(&key);

            Ok(LineageTree::Upstream(children))
        })
    }

    /// Check the health of every table feeding `target`
    ///
    /// Each source is counted independently; a failing source is captured
    /// in its own entry and never aborts the rest of the check.
    pub async fn check_table_sources(
        &self,
        target: &str,
    ) -> Result<SourceHealthReport, EngineError> {
        let upstream = self.get_upstream_tables(target).await?;

        if upstream.is_empty() {
            return Ok(SourceHealthReport::NoUpstream {
                error: format!("No upstream tables found for {target}"),
                hint: "Check if lineage metadata exists".to_string(),
            });
        }

        let mut checks = BTreeMap::new();
        for source in upstream {
            let check = match Identifier::table(&source) {
                Err(err) => SourceCheck::error(err.to_string()),
                Ok(table) => match self.store.count_rows(&table).await {
                    Ok(0) => SourceCheck::empty(),
                    Ok(count) => SourceCheck::healthy(count),
                    Err(err) => SourceCheck::error(err.to_string()),
                },
            };
            checks.insert(source, check);
        }

        Ok(SourceHealthReport::Checked(checks))
    }
}
