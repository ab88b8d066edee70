//! Comment stripping and statement splitting
//!
//! Comments are removed before splitting, so a `;` inside a comment never
//! produces a phantom statement. There is no nesting awareness beyond
//! that: a `;` inside a string literal or a CASE body still splits. That
//! is a known limitation of the scanner, not something to silently fix.

use regex::Regex;

/// Strips comments from script text and splits it into statements
pub struct SqlCleaner {
    block_comment: Regex,
}

impl SqlCleaner {
    pub fn new() -> Self {
        Self {
            block_comment: Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern compiles"),
        }
    }

    /// Remove `--` line comments and `/* ... */` block comments
    pub fn strip_comments(&self, sql: &str) -> String {
        let without_line_comments = sql
            .lines()
            .map(|line| match line.split_once("--") {
                Some((code, _)) => code,
                None => line,
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.block_comment
            .replace_all(&without_line_comments, "")
            .into_owned()
    }

    /// Strip comments, then split on `;`, discarding empty fragments
    pub fn split(&self, script: &str) -> Vec<String> {
        self.strip_comments(script)
            .split(';')
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for SqlCleaner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_line_comments_to_end_of_line() {
        let cleaner = SqlCleaner::new();
        let sql = "SELECT a, -- the key\n  b\nFROM t -- trailing";
        assert_eq!(cleaner.strip_comments(sql), "SELECT a, \n  b\nFROM t ");
    }

    #[test]
    fn strips_multiline_block_comments() {
        let cleaner = SqlCleaner::new();
        let sql = "SELECT a /* spans\nlines */ FROM t";
        assert_eq!(cleaner.strip_comments(sql), "SELECT a  FROM t");
    }

    #[test]
    fn splits_on_terminator_and_drops_empty_fragments() {
        let cleaner = SqlCleaner::new();
        let script = "CREATE TABLE a AS SELECT 1;\n\n  ;\nCREATE TABLE b AS SELECT 2;\n";
        let statements = cleaner.split(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[1].starts_with("CREATE TABLE b"));
    }

    #[test]
    fn terminator_inside_comment_does_not_split() {
        let cleaner = SqlCleaner::new();
        let script = "CREATE TABLE a AS -- not a boundary;\nSELECT 1;";
        let statements = cleaner.split(script);
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn terminator_inside_string_literal_still_splits() {
        // Documented limitation: no literal awareness.
        let cleaner = SqlCleaner::new();
        let script = "CREATE TABLE a AS SELECT 'x;y' AS v;";
        let statements = cleaner.split(script);
        assert_eq!(statements.len(), 2);
    }
}
