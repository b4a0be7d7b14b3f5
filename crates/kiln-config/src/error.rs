//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    // Validation errors
    #[error("mounted directory does not exist: {0}")]
    MountNotFound(PathBuf),

    #[error("mount URL `{0}` must start with `/`")]
    InvalidMountUrl(String),

    #[error("URL `{0}` is mounted more than once")]
    DuplicateMountUrl(String),

    #[error("HMR path `{0}` must start with `/`")]
    InvalidHmrPath(String),

    #[error("port must not be 0")]
    InvalidPort,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
