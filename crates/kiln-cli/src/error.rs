//! Error handling for the kiln CLI.
//!
//! Library crates return their own `thiserror` enums; [`CliError`] wraps them
//! at the command boundary and [`cli_error_to_miette`] turns the result into a
//! report in `main`.
//!
//! ```rust,no_run
//! use kiln_cli::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_index(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path).with_path(path)
//! }
//! ```

mod report;

use std::path::PathBuf;

use thiserror::Error;

pub use report::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    /// A source file could not be built or served.
    #[error("Build error: {0}")]
    Build(#[from] kiln_build::BuildError),

    /// A plugin is declared incorrectly.
    #[error("Plugin error: {0}")]
    Pipeline(#[from] kiln_build::PipelineError),

    /// The persistent build cache could not be opened.
    #[error("Cache error: {0}")]
    Cache(#[from] kiln_build::CacheError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors
    #[error("Server error: {0}")]
    Server(String),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_error_from_config_error() {
        let config_err = kiln_config::ConfigError::InvalidPort;
        let cli_err: CliError = config_err.into();
        assert!(matches!(cli_err, CliError::Config(_)));
        assert!(cli_err.to_string().contains("port must not be 0"));
    }

    #[test]
    fn test_cli_error_from_build_error() {
        let build_err = kiln_build::BuildError::NotFound("/missing.js".to_string());
        let cli_err: CliError = build_err.into();
        assert!(matches!(cli_err, CliError::Build(_)));
        assert!(cli_err.to_string().contains("/missing.js"));
    }

    #[test]
    fn test_result_ext_with_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let err = result.with_path("/test/path.txt").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_result_ext_with_path_keeps_other_errors() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "nope",
        ));

        let err = result.with_path("/test/path.txt").unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn test_result_ext_with_hint() {
        let result: std::result::Result<(), CliError> =
            Err(CliError::Server("address in use".to_string()));

        let err = result.with_hint("Pick a free port").unwrap_err();
        assert!(err.to_string().contains("Hint: Pick a free port"));
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("disk on fire"));

        let err = result.context("Failed to write output").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to write output"));
        assert!(msg.contains("disk on fire"));
    }
}
