//! Pattern-based lineage extraction
//!
//! Works with most SQL dialects because it only looks at statement shape:
//! a creation clause names the target, `FROM`/`JOIN` occurrences name the
//! sources, and `CASE`/aggregate expressions name derived columns.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use lineascope_core::{ColumnLineage, ColumnOrigin, FactSet, TableLineage, UNKNOWN_SOURCES};

use crate::clean::SqlCleaner;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?";
const NAME: &str = r"[A-Za-z_][A-Za-z0-9_]*";

/// Extracts lineage facts from cleaned statements
///
/// All patterns are compiled once at construction. The extractor is
/// immutable and can be shared across threads.
pub struct LineageExtractor {
    cleaner: SqlCleaner,

    /// `CREATE [OR REPLACE] TABLE|VIEW [IF NOT EXISTS] <target>`
    create: Regex,

    /// `FROM <table>` / `JOIN <table>`
    source: Regex,

    /// `CASE ... END [AS] <column>`; the body may span lines. Nested CASE
    /// is not handled: the inner span ends at the first `END`.
    case_expr: Regex,

    /// `<agg_fn>(...) [AS] <column>`; no nested-paren awareness.
    aggregate: Regex,
}

impl LineageExtractor {
    pub fn new() -> Self {
        let create = format!(
            r"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?(?:TABLE|VIEW)\s+(?:IF\s+NOT\s+EXISTS\s+)?({IDENT})"
        );
        let source = format!(r"(?i)\b(?:FROM|JOIN)\s+({IDENT})");
        let case_expr = format!(r"(?is)(CASE\s+.+?END)\s+(?:AS\s+)?({NAME})");
        let aggregate = format!(
            r"(?i)((?:SUM|AVG|COUNT|MIN|MAX|COALESCE|NULLIF)\s*\([^)]+\))\s+(?:AS\s+)?({NAME})"
        );

        Self {
            cleaner: SqlCleaner::new(),
            create: Regex::new(&create).expect("create pattern compiles"),
            source: Regex::new(&source).expect("source pattern compiles"),
            case_expr: Regex::new(&case_expr).expect("case pattern compiles"),
            aggregate: Regex::new(&aggregate).expect("aggregate pattern compiles"),
        }
    }

    /// Extract facts from one cleaned statement
    ///
    /// A statement without a creation clause contributes no facts; the
    /// build pass skips it and moves on. A statement with a target but no
    /// matched sources still yields column facts (with an `UNKNOWN`
    /// source list), just no table-lineage facts.
    pub fn extract_statement(&self, sql: &str, file_name: &str) -> FactSet {
        let mut facts = FactSet::default();

        let Some(create) = self.create.captures(sql) else {
            debug!(file = file_name, "no creation clause, skipping statement");
            return facts;
        };
        let target = create[1].to_string();
        debug!(target = %target, file = file_name, "found target");

        // Distinct sources in first-seen order, compared case-insensitively;
        // a self-reference is not a source.
        let mut sources: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for capture in self.source.captures_iter(sql) {
            let name = &capture[1];
            if name.eq_ignore_ascii_case(&target) {
                continue;
            }
            if seen.insert(name.to_ascii_lowercase()) {
                sources.push(name.to_string());
            }
        }
        if !sources.is_empty() {
            debug!(target = %target, sources = ?sources, "found sources");
        }

        for source in &sources {
            facts
                .table_lineage
                .push(TableLineage::new(&target, source, sql));
        }

        let source_list = if sources.is_empty() {
            UNKNOWN_SOURCES.to_string()
        } else {
            sources.join(", ")
        };

        // At most one column fact per target column. Conditional matches
        // are scanned first and always win over aggregate matches.
        let mut claimed: HashSet<String> = HashSet::new();

        for capture in self.case_expr.captures_iter(sql) {
            let logic = capture[1].trim().to_string();
            let column = capture[2].to_string();
            if !claimed.insert(column.clone()) {
                continue;
            }
            debug!(target = %target, column = %column, "computed column");
            facts.column_lineage.push(ColumnLineage {
                target_table: target.clone(),
                target_column: column,
                source_tables: source_list.clone(),
                origin: ColumnOrigin::Computed,
                transformation_logic: logic,
                sql_file_name: file_name.to_string(),
            });
        }

        for capture in self.aggregate.captures_iter(sql) {
            let logic = capture[1].trim().to_string();
            let column = capture[2].to_string();
            if !claimed.insert(column.clone()) {
                continue;
            }
            debug!(target = %target, column = %column, "aggregated column");
            facts.column_lineage.push(ColumnLineage {
                target_table: target.clone(),
                target_column: column,
                source_tables: source_list.clone(),
                origin: ColumnOrigin::Aggregated,
                transformation_logic: logic,
                sql_file_name: file_name.to_string(),
            });
        }

        facts
    }

    /// Clean, split, and extract an entire script
    pub fn extract_script(&self, script: &str, file_name: &str) -> FactSet {
        let mut facts = FactSet::default();
        for statement in self.cleaner.split(script) {
            facts.extend(self.extract_statement(&statement, file_name));
        }
        facts
    }
}

impl Default for LineageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(sql: &str) -> FactSet {
        LineageExtractor::new().extract_statement(sql, "test.sql")
    }

    #[test]
    fn plain_select_yields_no_facts() {
        let facts = extract("SELECT * FROM raw.employees");
        assert!(facts.is_empty());
    }

    #[test]
    fn create_view_and_if_not_exists_variants_match() {
        for sql in [
            "CREATE TABLE conformed.t AS SELECT 1 FROM raw.a",
            "CREATE OR REPLACE TABLE conformed.t AS SELECT 1 FROM raw.a",
            "CREATE VIEW conformed.t AS SELECT 1 FROM raw.a",
            "CREATE TABLE IF NOT EXISTS conformed.t AS SELECT 1 FROM raw.a",
        ] {
            let facts = extract(sql);
            assert_eq!(facts.table_lineage.len(), 1, "failed for: {sql}");
            assert_eq!(facts.table_lineage[0].target_table, "conformed.t");
            assert_eq!(facts.table_lineage[0].source_table, "raw.a");
        }
    }

    #[test]
    fn repeated_source_counts_once() {
        let facts = extract(
            "CREATE TABLE conformed.pairs AS \
             SELECT * FROM raw.events e1 JOIN raw.events e2 ON e1.id = e2.parent_id",
        );
        assert_eq!(facts.table_lineage.len(), 1);
        assert_eq!(facts.table_lineage[0].source_table, "raw.events");
    }

    #[test]
    fn source_dedup_is_case_insensitive() {
        let facts = extract(
            "CREATE TABLE conformed.t AS SELECT * FROM raw.Events JOIN RAW.EVENTS x ON 1=1",
        );
        assert_eq!(facts.table_lineage.len(), 1);
        // first-seen spelling is preserved
        assert_eq!(facts.table_lineage[0].source_table, "raw.Events");
    }

    #[test]
    fn self_reference_is_not_a_source() {
        let facts = extract(
            "CREATE OR REPLACE TABLE conformed.t AS SELECT * FROM conformed.t JOIN raw.a ON 1=1",
        );
        assert_eq!(facts.table_lineage.len(), 1);
        assert_eq!(facts.table_lineage[0].source_table, "raw.a");
    }

    #[test]
    fn computed_column_with_multiline_case() {
        let facts = extract(
            "CREATE TABLE s.fact AS SELECT\n\
             CASE\n  WHEN salary > 100000 THEN 'HIGH'\n  ELSE 'LOW'\nEND AS risk_level\n\
             FROM raw.job_history j JOIN raw.employees e ON j.emp_id = e.emp_id",
        );
        assert_eq!(facts.column_lineage.len(), 1);
        let fact = &facts.column_lineage[0];
        assert_eq!(fact.target_column, "risk_level");
        assert_eq!(fact.origin, ColumnOrigin::Computed);
        assert!(fact.transformation_logic.starts_with("CASE"));
        assert!(fact.transformation_logic.ends_with("END"));
        assert!(fact.transformation_logic.contains('\n'));
        assert_eq!(fact.source_tables, "raw.job_history, raw.employees");
    }

    #[test]
    fn aggregate_columns_are_extracted() {
        let facts = extract(
            "CREATE TABLE s.summary AS SELECT dept, \
             COUNT(*) AS headcount, AVG(salary) avg_salary \
             FROM raw.employees GROUP BY dept",
        );
        let columns: Vec<(&str, ColumnOrigin)> = facts
            .column_lineage
            .iter()
            .map(|f| (f.target_column.as_str(), f.origin))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("headcount", ColumnOrigin::Aggregated),
                ("avg_salary", ColumnOrigin::Aggregated),
            ]
        );
    }

    #[test]
    fn computed_takes_priority_over_aggregated_for_same_column() {
        // Both patterns match a column named `total`; only the conditional
        // fact survives.
        let facts = extract(
            "CREATE TABLE s.t AS SELECT \
             CASE WHEN amount > 0 THEN 1 ELSE 0 END AS total, \
             SUM(amount) AS total \
             FROM raw.pay",
        );
        let total_facts: Vec<&ColumnLineage> = facts
            .column_lineage
            .iter()
            .filter(|f| f.target_column == "total")
            .collect();
        assert_eq!(total_facts.len(), 1);
        assert_eq!(total_facts[0].origin, ColumnOrigin::Computed);
    }

    #[test]
    fn target_without_sources_marks_unknown() {
        let facts = extract(
            "CREATE TABLE s.flags AS SELECT CASE WHEN 1 = 1 THEN 'y' ELSE 'n' END AS always_on",
        );
        assert!(facts.table_lineage.is_empty());
        assert_eq!(facts.column_lineage.len(), 1);
        assert_eq!(facts.column_lineage[0].source_tables, UNKNOWN_SOURCES);
    }

    #[test]
    fn script_extraction_is_deterministic() {
        let extractor = LineageExtractor::new();
        let script = "-- staging\nCREATE TABLE stg.a AS SELECT * FROM raw.x;\n\
                      CREATE TABLE stg.b AS SELECT SUM(v) AS total FROM stg.a GROUP BY k;";
        let first = extractor.extract_script(script, "stg.sql");
        let second = extractor.extract_script(script, "stg.sql");
        assert_eq!(first, second);
        assert_eq!(first.table_lineage.len(), 2);
        assert_eq!(first.distinct_targets(), 2);
    }
}
