//! `kiln build`: build every mounted file once and write it to disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use kiln_build::BuildOrchestrator;
use kiln_config::KilnConfig;
use walkdir::WalkDir;

use crate::cli::BuildArgs;
use crate::dev::should_ignore;
use crate::error::{Result, ResultExt};
use crate::project::{ProjectOptions, build_orchestrator, load_config};
use crate::ui;

/// Execute the build command.
///
/// Every file under a mount is served through the same pipeline as `kiln dev`
/// (without HMR) and the response is written to the output directory at its
/// URL. The first failure aborts the build.
pub async fn execute(args: BuildArgs) -> Result<()> {
    let start_time = Instant::now();

    let config = load_config(&args.root, args.config.as_deref(), &args.overrides())?;
    let orchestrator =
        build_orchestrator(&config, &ProjectOptions::build(&config), Vec::new())?;

    let written = build_project(&config, &orchestrator).await?;
    if written.is_empty() {
        ui::warning("No files found under the configured mounts");
    }

    ui::print_build_summary(&written, start_time.elapsed());
    ui::success(&format!("Wrote output to {}", config.out_dir().display()));
    Ok(())
}

/// Build and write every mounted file, returning `(url, bytes)` per output.
pub async fn build_project(
    config: &KilnConfig,
    orchestrator: &BuildOrchestrator,
) -> Result<Vec<(String, u64)>> {
    let out_dir = config.out_dir();
    let mut written = Vec::new();

    for source in collect_sources(config, &out_dir) {
        for url in orchestrator.urls_for_source(&source) {
            let response = orchestrator
                .serve(&url)
                .await
                .map_err(|err| {
                    tracing::error!(url = %url, error = %err, "build failed");
                    err
                })?;

            let target = out_dir.join(url.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.with_path(parent)?;
            }
            tokio::fs::write(&target, &response.body)
                .await
                .context(format!("failed to write {}", target.display()))?;

            tracing::debug!(url = %url, path = %target.display(), "wrote output");
            written.push((url, response.body.len() as u64));
        }
    }

    Ok(written)
}

/// Every file under a mount, skipping the output and cache directories.
///
/// Nested mounts can reach the same file twice; the set keeps one copy.
fn collect_sources(config: &KilnConfig, out_dir: &Path) -> BTreeSet<PathBuf> {
    let cache_dir = config.cache_dir();
    let mut sources = BTreeSet::new();

    for mount in config.resolved_mounts() {
        let walker = WalkDir::new(&mount.dir).follow_links(true).into_iter();
        for entry in walker.filter_entry(|entry| {
            let path = entry.path();
            !path.starts_with(out_dir)
                && !path.starts_with(&cache_dir)
                && !should_ignore(path, &mount.dir, &config.dev.watch_ignore)
        }) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    sources.insert(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "skipping unreadable entry"),
            }
        }
    }

    sources
}
