//! Configuration for the kiln dev server.
//!
//! [`KilnConfig`] is assembled by figment from defaults, `kiln.config.json`,
//! `KILN_*` environment variables and command line overrides, then checked
//! with [`KilnConfig::validate`].

pub mod config;
pub mod error;
pub mod loading;
pub mod validation;

pub use config::{
    BuildOptions, CONFIG_FILE_NAME, CacheOptions, DevOptions, KilnConfig, ResolvedMount,
};
pub use error::{ConfigError, Result};
pub use loading::{BuildOverrides, ConfigOverrides, DevOverrides, ENV_PREFIX};
