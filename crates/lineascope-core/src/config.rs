//! Configuration schema (lineascope.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::ident::{Identifier, IdentifierKind, InvalidIdentifier};

/// Names of the persisted metadata relations
///
/// The two fact tables live under a configurable schema. Defaults match
/// the conventional layout: `meta.table_lineage` and `meta.column_lineage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataNamespace {
    /// Schema housing the fact tables
    #[serde(default = "default_meta_schema")]
    pub schema: String,

    /// Table-level lineage relation name
    #[serde(default = "default_table_lineage")]
    pub table_lineage: String,

    /// Column-level lineage relation name
    #[serde(default = "default_column_lineage")]
    pub column_lineage: String,
}

fn default_meta_schema() -> String {
    "meta".to_string()
}

fn default_table_lineage() -> String {
    "table_lineage".to_string()
}

fn default_column_lineage() -> String {
    "column_lineage".to_string()
}

impl Default for MetadataNamespace {
    fn default() -> Self {
        Self {
            schema: default_meta_schema(),
            table_lineage: default_table_lineage(),
            column_lineage: default_column_lineage(),
        }
    }
}

impl MetadataNamespace {
    /// Qualified table-lineage reference, e.g. `meta.table_lineage`
    pub fn table_lineage_ref(&self) -> String {
        format!("{}.{}", self.schema, self.table_lineage)
    }

    /// Qualified column-lineage reference, e.g. `meta.column_lineage`
    pub fn column_lineage_ref(&self) -> String {
        format!("{}.{}", self.schema, self.column_lineage)
    }

    /// Validated schema identifier
    ///
    /// Namespace names come from configuration, so they pass through the
    /// same identifier gate as caller-supplied names before any adapter
    /// interpolates them.
    pub fn schema_ident(&self) -> Result<Identifier, InvalidIdentifier> {
        Identifier::parse(&self.schema, IdentifierKind::Schema)
    }

    /// Validated qualified table-lineage identifier
    pub fn table_lineage_ident(&self) -> Result<Identifier, InvalidIdentifier> {
        Identifier::parse(&self.table_lineage_ref(), IdentifierKind::Table)
    }

    /// Validated qualified column-lineage identifier
    pub fn column_lineage_ident(&self) -> Result<Identifier, InvalidIdentifier> {
        Identifier::parse(&self.column_lineage_ref(), IdentifierKind::Table)
    }
}

/// Backing store connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store type ("postgres", "memory")
    #[serde(rename = "type")]
    pub store_type: String,

    /// Connection string for network stores
    #[serde(default)]
    pub url: Option<String>,

    /// Store-specific settings
    #[serde(flatten)]
    pub settings: HashMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: "postgres".to_string(),
            url: None,
            settings: HashMap::new(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned for transformation scripts during a build pass
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,

    /// Metadata relation names
    #[serde(default)]
    pub metadata: MetadataNamespace,

    /// Capacity of the trace result cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Default depth bound for lineage tree expansion
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Backing store connection
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_sql_dir() -> PathBuf {
    PathBuf::from("etl")
}

fn default_cache_capacity() -> usize {
    100
}

fn default_max_depth() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sql_dir: default_sql_dir(),
            metadata: MetadataNamespace::default(),
            cache_capacity: default_cache_capacity(),
            max_depth: default_max_depth(),
            store: None,
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Resolve relative paths against the config file's directory
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Script directory resolved against the project root
    pub fn resolved_sql_dir(&self) -> PathBuf {
        if self.sql_dir.is_absolute() {
            self.sql_dir.clone()
        } else {
            self.project_root.join(&self.sql_dir)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
