//! Lineage fact types
//!
//! Facts are derived data: a build pass regenerates the full set from the
//! current script directory, and the store replaces its contents wholesale.
//! Nothing here is ever mutated in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal recorded in the source-table column when a statement declared a
/// target but matched no sources.
pub const UNKNOWN_SOURCES: &str = "UNKNOWN";

/// Coarse derivation category recorded where a real source-column
/// reference would go
///
/// The pattern scanner cannot resolve actual source columns, so column
/// facts carry a category instead: conditional expressions are `Computed`,
/// aggregate-function expressions are `Aggregated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnOrigin {
    /// Derived by a `CASE ... END` conditional expression
    Computed,

    /// Derived by an aggregate or null-handling function call
    Aggregated,
}

impl ColumnOrigin {
    /// Stable marker string persisted in the `source_column` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Computed => "COMPUTED",
            Self::Aggregated => "AGGREGATED",
        }
    }
}

impl fmt::Display for ColumnOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted marker string that is not a recognized [`ColumnOrigin`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized column origin marker '{0}'")]
pub struct UnknownOrigin(pub String);

impl FromStr for ColumnOrigin {
    type Err = UnknownOrigin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPUTED" => Ok(Self::Computed),
            "AGGREGATED" => Ok(Self::Aggregated),
            other => Err(UnknownOrigin(other.to_string())),
        }
    }
}

/// "`target_table`'s defining statement reads from `source_table`"
///
/// A statement with several sources yields one fact per distinct source,
/// all sharing the same statement text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLineage {
    /// Table or view created by the statement
    pub target_table: String,

    /// One table the statement reads from
    pub source_table: String,

    /// Full (comment-stripped) statement text
    pub sql_text: String,
}

impl TableLineage {
    pub fn new(
        target_table: impl Into<String>,
        source_table: impl Into<String>,
        sql_text: impl Into<String>,
    ) -> Self {
        Self {
            target_table: target_table.into(),
            source_table: source_table.into(),
            sql_text: sql_text.into(),
        }
    }
}

/// How one output column of a target table is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLineage {
    /// Table containing the derived column
    pub target_table: String,

    /// The derived column
    pub target_column: String,

    /// Display list of the statement's source tables, or
    /// [`UNKNOWN_SOURCES`] when none were matched
    pub source_tables: String,

    /// Derivation category (persisted in the `source_column` column)
    pub origin: ColumnOrigin,

    /// The matched expression span, line breaks preserved
    pub transformation_logic: String,

    /// Script file the statement came from
    pub sql_file_name: String,
}

/// The in-memory hand-off between an extraction pass and the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSet {
    pub table_lineage: Vec<TableLineage>,
    pub column_lineage: Vec<ColumnLineage>,
}

impl FactSet {
    pub fn is_empty(&self) -> bool {
        self.table_lineage.is_empty() && self.column_lineage.is_empty()
    }

    /// Append all facts from `other`, preserving order
    pub fn extend(&mut self, other: FactSet) {
        self.table_lineage.extend(other.table_lineage);
        self.column_lineage.extend(other.column_lineage);
    }

    /// Number of distinct target tables across the table-lineage facts
    pub fn distinct_targets(&self) -> usize {
        let mut targets: Vec<&str> = self
            .table_lineage
            .iter()
            .map(|fact| fact.target_table.as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets.len()
    }
}
