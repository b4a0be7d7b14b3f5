//! Miette diagnostic conversion for CLI errors.

use kiln_build::{BuildError, PipelineError};
use kiln_config::ConfigError;
use miette::Report;

use crate::error::CliError;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => config_error_to_miette(e),
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Pipeline(e) => pipeline_error_to_miette(e),
        CliError::Cache(e) => miette::miette!(
            help = "Delete the cache directory or set `cache.enabled` to false",
            "Cache error: {}",
            e
        ),
        _ => miette::miette!("{}", err),
    }
}

fn config_error_to_miette(err: ConfigError) -> Report {
    match err {
        ConfigError::NotFound(path) => miette::miette!(
            help = "Create a kiln.config.json file or pass an existing --config path",
            "Config file not found: {}",
            path.display()
        ),
        ConfigError::MountNotFound(dir) => miette::miette!(
            help = "Every key under `mount` must be an existing directory relative to the root",
            "Mounted directory does not exist: {}",
            dir.display()
        ),
        other => miette::miette!("Configuration error: {}", other),
    }
}

fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::UrlCollision { url, candidates } => {
            let files: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            miette::miette!(
                help = "Rename one of the files so each URL has a single source",
                "URL {} is produced by more than one file:\n  {}",
                url,
                files.join("\n  ")
            )
        }
        other => miette::miette!("{}", other),
    }
}

fn pipeline_error_to_miette(err: PipelineError) -> Report {
    match err {
        PipelineError::InvalidPlugin { plugin, reason } => miette::miette!(
            help = "A plugin that declares `resolve` must also implement `load`, and the reverse",
            "Invalid plugin `{}`: {}",
            plugin,
            reason
        ),
        other => miette::miette!("{}", other),
    }
}
