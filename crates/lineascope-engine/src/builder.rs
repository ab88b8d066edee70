//! Metadata build pass
//!
//! Scans a directory of transformation scripts, extracts lineage facts,
//! and replaces the persisted fact set in one transactional rebuild. The
//! facts are always regenerable from the scripts, so a failed build
//! leaves the previously committed metadata untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use lineascope_core::{FactSet, MetadataNamespace};
use lineascope_extract::LineageExtractor;
use lineascope_store::MetadataStore;

use crate::error::EngineError;

/// Counts reported after a successful build pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BuildSummary {
    /// Script files scanned
    pub script_files: usize,

    /// Distinct target tables across the table-lineage facts
    pub distinct_targets: usize,

    /// Table-lineage facts written
    pub table_facts: usize,

    /// Column-lineage facts written
    pub column_facts: usize,
}

/// Runs build passes against a [`MetadataStore`]
pub struct MetadataBuilder {
    store: Arc<dyn MetadataStore>,
    namespace: MetadataNamespace,
    extractor: LineageExtractor,
}

impl MetadataBuilder {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            namespace: MetadataNamespace::default(),
            extractor: LineageExtractor::new(),
        }
    }

    /// Override the metadata namespace
    pub fn with_namespace(mut self, namespace: MetadataNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Extract facts from every `.sql` file under `sql_dir`
    ///
    /// Files are visited in sorted path order and statements in document
    /// order, so the produced fact set is deterministic for an unchanged
    /// script set.
    pub fn extract_facts(&self, sql_dir: &Path) -> Result<FactSet, EngineError> {
        let scripts = collect_scripts(sql_dir)?;
        self.extract_from(sql_dir, &scripts)
    }

    fn extract_from(&self, sql_dir: &Path, scripts: &[PathBuf]) -> Result<FactSet, EngineError> {
        info!(
            dir = %sql_dir.display(),
            files = scripts.len(),
            "scanning transformation scripts"
        );

        let mut facts = FactSet::default();
        for path in scripts {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("unknown.sql")
                .to_string();

            let script = std::fs::read_to_string(path).map_err(|source| {
                EngineError::ScriptRead {
                    path: path.clone(),
                    source,
                }
            })?;

            let extracted = self.extractor.extract_script(&script, &file_name);
            info!(
                file = %file_name,
                table_facts = extracted.table_lineage.len(),
                column_facts = extracted.column_lineage.len(),
                "parsed script"
            );
            facts.extend(extracted);
        }

        Ok(facts)
    }

    /// Run a full build pass: extract and transactionally rebuild
    ///
    /// All-or-nothing: on a store failure the rebuild rolls back and the
    /// prior fact set stays queryable; the error carries the cause.
    pub async fn build_dir(&self, sql_dir: &Path) -> Result<BuildSummary, EngineError> {
        let scripts = collect_scripts(sql_dir)?;
        let facts = self.extract_from(sql_dir, &scripts)?;

        let summary = BuildSummary {
            script_files: scripts.len(),
            distinct_targets: facts.distinct_targets(),
            table_facts: facts.table_lineage.len(),
            column_facts: facts.column_lineage.len(),
        };

        self.store
            .rebuild(&self.namespace, &facts)
            .await
            .map_err(|source| EngineError::BuildFailed { source })?;

        info!(
            tables = summary.distinct_targets,
            table_facts = summary.table_facts,
            column_facts = summary.column_facts,
            "metadata build complete"
        );
        Ok(summary)
    }
}

/// Sorted `.sql` files under `dir`
fn collect_scripts(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !dir.is_dir() {
        return Err(EngineError::NoScripts {
            dir: dir.to_path_buf(),
        });
    }

    let mut scripts: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let path = entry.into_path();
                let is_sql = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("sql"))
                    .unwrap_or(false);
                is_sql.then_some(path)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "skipping unreadable directory entry");
                None
            }
        })
        .collect();
    scripts.sort();

    if scripts.is_empty() {
        return Err(EngineError::NoScripts {
            dir: dir.to_path_buf(),
        });
    }

    Ok(scripts)
}
