//! Engine error types

use std::path::PathBuf;

use lineascope_core::InvalidIdentifier;
use lineascope_store::StoreError;

/// Errors surfaced by engine and builder operations
///
/// Negative query outcomes (no metadata built, no matching fact) are not
/// errors; they are distinct variants of
/// [`TraceOutcome`](crate::report::TraceOutcome), safe to handle without
/// touching this type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed identifier rejected at the query boundary
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// The backing store failed executing a read
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A rebuild transaction failed and was rolled back
    #[error("metadata build failed, previous fact set preserved: {source}")]
    BuildFailed {
        #[source]
        source: StoreError,
    },

    /// The build pass found nothing to extract
    #[error("no transformation scripts found under {dir}")]
    NoScripts { dir: PathBuf },

    /// A script file could not be read
    #[error("failed to read script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
