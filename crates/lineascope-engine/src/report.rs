//! Query outcome and report types
//!
//! Negative outcomes are ordinary values, not errors: every query-side
//! operation is safe to call speculatively during interactive
//! exploration.

use std::collections::BTreeMap;

use serde::Serialize;

use lineascope_core::ColumnLineage;
use lineascope_store::Row;

/// Result of a column trace
///
/// "Metadata never built" and "built but no matching fact" are distinct
/// variants; callers must be able to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// A matching fact was recorded
    Found(ColumnLineage),

    /// Metadata exists but holds no fact for this target/column
    NotFound { target: String, column: String },

    /// The column-lineage relation has not been built yet
    MetadataMissing { table: String },
}

impl TraceOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Formatted report, line breaks in transformation text preserved
    pub fn render(&self) -> String {
        match self {
            Self::Found(fact) => {
                let mut lines = vec![
                    format!(
                        "Column lineage: {}.{}",
                        fact.target_table, fact.target_column
                    ),
                    format!("  source tables: {}", fact.source_tables),
                    format!("  derivation: {}", fact.origin),
                    "  transformation:".to_string(),
                ];
                for line in fact.transformation_logic.lines() {
                    lines.push(format!("    {line}"));
                }
                lines.push(format!("  defined in: {}", fact.sql_file_name));
                lines.join("\n")
            }
            Self::NotFound { target, column } => format!(
                "No lineage found for {target}.{column}\n\
                 Possible reasons:\n\
                 \x20 - the column is not present in the metadata\n\
                 \x20 - the metadata is stale; run a build pass\n\
                 \x20 - the column may be a simple pass-through"
            ),
            Self::MetadataMissing { table } => format!(
                "Metadata table not found: {table}\n\
                 Run a metadata build first to create lineage data."
            ),
        }
    }
}

/// Health classification for one upstream table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Table readable with at least one row
    Healthy,

    /// Table readable but holds zero rows
    Empty,

    /// The row count failed
    Error,
}

/// Row count or captured failure for one upstream table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCheck {
    pub status: SourceStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceCheck {
    pub fn healthy(row_count: u64) -> Self {
        Self {
            status: SourceStatus::Healthy,
            row_count: Some(row_count),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: SourceStatus::Empty,
            row_count: Some(0),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Error,
            row_count: None,
            error: Some(message.into()),
        }
    }
}

/// Result of a source health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SourceHealthReport {
    /// The target has no recorded upstream tables
    NoUpstream { error: String, hint: String },

    /// Per-source outcomes; one failing source never aborts the rest
    Checked(BTreeMap<String, SourceCheck>),
}

impl SourceHealthReport {
    pub fn checks(&self) -> Option<&BTreeMap<String, SourceCheck>> {
        match self {
            Self::Checked(checks) => Some(checks),
            Self::NoUpstream { .. } => None,
        }
    }
}

/// Result of a single-row inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowLookup {
    /// The matching row as a field map
    Found { row: Row },

    /// No row matched the key
    NotFound { message: String },
}

impl RowLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineascope_core::ColumnOrigin;

    #[test]
    fn found_report_preserves_embedded_line_breaks() {
        let outcome = TraceOutcome::Found(ColumnLineage {
            target_table: "conformed.churn_risk".to_string(),
            target_column: "risk_level".to_string(),
            source_tables: "raw.job_history, raw.employees".to_string(),
            origin: ColumnOrigin::Computed,
            transformation_logic: "CASE\n  WHEN x THEN 'HIGH'\n  ELSE 'LOW'\nEND".to_string(),
            sql_file_name: "risk.sql".to_string(),
        });

        let report = outcome.render();
        assert!(report.contains("conformed.churn_risk.risk_level"));
        assert!(report.contains("raw.job_history, raw.employees"));
        assert!(report.contains("COMPUTED"));
        assert!(report.contains("    CASE"));
        assert!(report.contains("      ELSE 'LOW'"));
        assert!(report.contains("risk.sql"));
    }

    #[test]
    fn negative_outcomes_render_distinct_reports() {
        let missing = TraceOutcome::MetadataMissing {
            table: "meta.column_lineage".to_string(),
        };
        let not_found = TraceOutcome::NotFound {
            target: "conformed.churn_risk".to_string(),
            column: "salary".to_string(),
        };

        assert_ne!(missing.render(), not_found.render());
        assert!(missing.render().contains("meta.column_lineage"));
        assert!(not_found.render().contains("No lineage found"));
    }

    #[test]
    fn source_check_serialization_skips_absent_fields() {
        let healthy = serde_json::to_string(&SourceCheck::healthy(10)).unwrap();
        assert!(healthy.contains("row_count"));
        assert!(!healthy.contains("error"));

        let failed = serde_json::to_string(&SourceCheck::error("boom")).unwrap();
        assert!(failed.contains("error"));
        assert!(!failed.contains("row_count"));
    }
}
