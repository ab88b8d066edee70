//! Validated table, column, and schema identifiers
//!
//! Every identifier accepted at a query boundary must match `name` or
//! `schema.name` where `name` is `[A-Za-z_][A-Za-z0-9_]*`. Store adapters
//! only accept `Identifier` values, so unvalidated text can never be
//! interpolated into generated query text.

use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

fn safe_identifier() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("identifier pattern compiles")
    })
}

/// What kind of identifier was being validated, for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Table reference (`employees` or `raw.employees`)
    Table,

    /// Column reference
    Column,

    /// Schema name
    Schema,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Schema => "schema",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Malformed or unsafe identifier, rejected before touching the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} identifier '{value}': only letters, digits, and underscores are allowed")]
pub struct InvalidIdentifier {
    /// Kind of identifier that failed validation
    pub kind: IdentifierKind,

    /// The rejected input
    pub value: String,
}

/// A validated `name` or `schema.name` reference
///
/// Construct via [`Identifier::parse`] (or the [`Identifier::table`],
/// [`Identifier::column`], [`Identifier::schema`] shorthands). The inner
/// string is guaranteed to match the safe-identifier shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Validate `value` as an identifier of the given kind
    pub fn parse(value: &str, kind: IdentifierKind) -> Result<Self, InvalidIdentifier> {
        if safe_identifier().is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidIdentifier {
                kind,
                value: value.to_string(),
            })
        }
    }

    /// Validate a table reference
    pub fn table(value: &str) -> Result<Self, InvalidIdentifier> {
        Self::parse(value, IdentifierKind::Table)
    }

    /// Validate a column reference
    pub fn column(value: &str) -> Result<Self, InvalidIdentifier> {
        Self::parse(value, IdentifierKind::Column)
    }

    /// Validate a schema name
    pub fn schema(value: &str) -> Result<Self, InvalidIdentifier> {
        Self::parse(value, IdentifierKind::Schema)
    }

    /// The validated identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Schema part of a qualified reference, if present
    pub fn schema_part(&self) -> Option<&str> {
        self.0.split_once('.').map(|(schema, _)| schema)
    }

    /// Unqualified name (the part after the dot, or the whole identifier)
    pub fn name(&self) -> &str {
        self.0
            .split_once('.')
            .map(|(_, name)| name)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_qualified_names() {
        assert!(Identifier::table("employees").is_ok());
        assert!(Identifier::table("raw.employees").is_ok());
        assert!(Identifier::column("risk_level").is_ok());
        assert!(Identifier::table("_private").is_ok());
        assert!(Identifier::table("t2").is_ok());
    }

    #[test]
    fn rejects_injection_shapes() {
        assert!(Identifier::table("emp; DROP TABLE x").is_err());
        assert!(Identifier::table("' OR 1=1").is_err());
        assert!(Identifier::table("").is_err());
        assert!(Identifier::table("a.b.c").is_err());
        assert!(Identifier::table("1starts_with_digit").is_err());
        assert!(Identifier::table("has space").is_err());
        assert!(Identifier::table("trailing.").is_err());
    }

    #[test]
    fn error_names_the_kind_and_value() {
        let err = Identifier::column("bad name").unwrap_err();
        assert_eq!(err.kind, IdentifierKind::Column);
        assert_eq!(err.value, "bad name");
        assert!(err.to_string().contains("column"));
        assert!(err.to_string().contains("bad name"));
    }

    #[test]
    fn splits_qualified_references() {
        let id = Identifier::table("raw.employees").unwrap();
        assert_eq!(id.schema_part(), Some("raw"));
        assert_eq!(id.name(), "employees");

        let bare = Identifier::table("employees").unwrap();
        assert_eq!(bare.schema_part(), None);
        assert_eq!(bare.name(), "employees");
    }
}
