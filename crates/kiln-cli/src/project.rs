//! Turning a loaded [`KilnConfig`] into a [`BuildOrchestrator`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiln_build::{
    BuildOrchestrator, CacheStore, FailurePolicy, ImportMap, ImportMapResolver, SharedPlugin,
};
use kiln_config::{ConfigOverrides, KilnConfig};

use crate::error::{Result, ResultExt};

/// How a command wants its orchestrator set up.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    pub hmr: bool,
    pub policy: FailurePolicy,
    /// Open the persistent cache (when the config enables it).
    pub persistent_cache: bool,
}

impl ProjectOptions {
    /// `kiln dev`: lenient plugins, HMR and persistent cache per config.
    pub fn dev(config: &KilnConfig) -> Self {
        Self {
            hmr: config.dev.hmr,
            policy: FailurePolicy::Continue,
            persistent_cache: config.cache.enabled,
        }
    }

    /// `kiln build`: fresh builds without HMR.
    pub fn build(config: &KilnConfig) -> Self {
        Self {
            hmr: false,
            policy: if config.build.fail_fast {
                FailurePolicy::FailFast
            } else {
                FailurePolicy::Continue
            },
            persistent_cache: false,
        }
    }
}

/// Load and validate the configuration for the project at `root`.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<KilnConfig> {
    let base = std::fs::canonicalize(root).with_path(root)?;
    let config = KilnConfig::load(&base, config_path, overrides)?;
    config.validate()?;
    tracing::debug!(root = %config.root.display(), "configuration loaded");
    Ok(config)
}

/// Assemble an orchestrator with the given plugins.
///
/// Must be called inside a Tokio runtime.
pub fn build_orchestrator(
    config: &KilnConfig,
    options: &ProjectOptions,
    plugins: Vec<SharedPlugin>,
) -> Result<BuildOrchestrator> {
    let mut builder = BuildOrchestrator::builder(&config.root)
        .policy(options.policy)
        .hmr(options.hmr)
        .hmr_debounce(Duration::from_millis(config.dev.hmr_debounce_ms));

    for mount in config.resolved_mounts() {
        builder = builder.mount(mount.dir, mount.url);
    }
    for (from, to) in &config.alias {
        builder = builder.alias(from, to);
    }
    for package in &config.external {
        builder = builder.external(package);
    }
    for plugin in plugins {
        builder = builder.plugin(plugin);
    }

    if let Some(path) = config.import_map_path() {
        let map = ImportMap::from_path(&path)
            .with_path(&path)
            .with_hint("Run your package install step to generate the import map")?;
        builder = builder.package_resolver(Arc::new(ImportMapResolver::new(
            map,
            config.package_url.clone(),
        )));
    }

    if options.persistent_cache {
        let dir = config.cache_dir();
        let store = CacheStore::open(&dir)?;
        tracing::debug!(dir = %dir.display(), "opened persistent cache");
        builder = builder.cache_store(Arc::new(store));
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::DevOverrides;

    #[tokio::test]
    async fn test_orchestrator_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.js"), "export default 1;").unwrap();
        std::fs::write(
            dir.path().join("kiln.config.json"),
            r#"{"mount": {"src": "/_dist_"}, "cache": {"dir": ".cache"}}"#,
        )
        .unwrap();

        let config = load_config(dir.path(), None, &ConfigOverrides::default()).unwrap();
        let orchestrator =
            build_orchestrator(&config, &ProjectOptions::dev(&config), Vec::new()).unwrap();

        let response = orchestrator.serve("/_dist_/app.js").await.unwrap();
        assert_eq!(response.body, b"export default 1;");
        assert!(config.root.join(".cache/cache.redb").is_file());
    }

    #[test]
    fn test_missing_root_is_file_not_found() {
        let err = load_config(
            Path::new("/definitely/not/here"),
            None,
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::CliError::FileNotFound(_)));
    }

    #[test]
    fn test_build_options_follow_fail_fast() {
        let mut config = KilnConfig::default();
        assert_eq!(ProjectOptions::build(&config).policy, FailurePolicy::FailFast);
        config.build.fail_fast = false;
        assert_eq!(ProjectOptions::build(&config).policy, FailurePolicy::Continue);
        assert!(!ProjectOptions::build(&config).hmr);
    }

    #[test]
    fn test_dev_options_follow_hmr_override() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            dev: DevOverrides {
                hmr: Some(false),
                ..DevOverrides::default()
            },
            ..ConfigOverrides::default()
        };
        let config = load_config(dir.path(), None, &overrides).unwrap();
        assert!(!ProjectOptions::dev(&config).hmr);
    }
}
