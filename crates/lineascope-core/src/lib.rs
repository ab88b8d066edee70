//! Lineascope Core
//!
//! Core domain model with the types shared by every other crate:
//! lineage facts, validated identifiers, the metadata namespace, and
//! configuration.

pub mod config;
pub mod fact;
pub mod ident;

pub use config::{Config, ConfigError, MetadataNamespace, StoreConfig};
pub use fact::{ColumnLineage, ColumnOrigin, FactSet, TableLineage, UnknownOrigin, UNKNOWN_SOURCES};
pub use ident::{Identifier, IdentifierKind, InvalidIdentifier};
