//! Error types for kiln-build.

use std::path::PathBuf;
use std::sync::Arc;

use crate::plugin::PluginError;

/// Errors raised while constructing or running the plugin pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A plugin violates the plugin contract at registration time.
    #[error("invalid plugin `{plugin}`: {reason}")]
    InvalidPlugin { plugin: String, reason: String },

    /// A multi-output load returned an extension the plugin never declared.
    #[error("plugin `{plugin}` returned undeclared output `{extension}` for {}", path.display())]
    UndeclaredOutput {
        plugin: String,
        extension: String,
        path: PathBuf,
    },

    /// A plugin hook failed and the pipeline runs in fail-fast mode.
    #[error("plugin `{plugin}` failed on {}: {source}", path.display())]
    PluginFailed {
        plugin: String,
        path: PathBuf,
        #[source]
        source: PluginError,
    },

    /// Reading the raw source file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced to request handlers.
///
/// Cloneable so a single shared build result can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// No mounted source file serves this URL.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one source file on disk claims the same URL.
    #[error("URL {url} is claimed by multiple files: {}", display_paths(.candidates))]
    UrlCollision {
        url: String,
        candidates: Vec<PathBuf>,
    },

    /// The pipeline failed for this file.
    #[error("build failed for {}: {source}", path.display())]
    Pipeline {
        path: PathBuf,
        #[source]
        source: Arc<PipelineError>,
    },

    /// Reading the source file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The build succeeded but produced no output for the requested extension.
    #[error("{} has no {extension} output", path.display())]
    MissingOutput { path: PathBuf, extension: String },
}

impl BuildError {
    /// True for errors that should map to a 404 rather than a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BuildError::NotFound(_) | BuildError::MissingOutput { .. }
        )
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error types for persistent cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Cache entry not found.
    #[error("cache miss")]
    CacheMiss,

    /// Cache database error.
    #[error("cache database error: {0}")]
    Database(String),

    /// Encoding an entry failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored entry could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry was written by an incompatible format version.
    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CacheError {
                fn from(err: $ty) -> Self {
                    CacheError::Database(err.to_string())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError,
);
