//! Rewriting import specifiers into browser-loadable URLs.
//!
//! Resolution order: protocol URLs and proxy URLs, externals, aliases,
//! root-relative URLs, relative file paths, then bare package specifiers.
//! Nothing is cached; every relative resolution stats the disk.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use path_clean::PathClean;
use serde::Deserialize;

use crate::build_map::{file_extension, is_script_extension};
use crate::mount::MountTable;

/// Suffix that turns a non-script URL into an importable proxy module.
pub const PROXY_MARKER: &str = ".proxy.js";

/// Extensions probed for extensionless relative imports, before plugin inputs.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".jsx", ".ts", ".tsx", ".json"];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Url(String),
    NotFound,
}

impl Resolution {
    pub fn url(&self) -> Option<&str> {
        match self {
            Resolution::Url(url) => Some(url),
            Resolution::NotFound => None,
        }
    }
}

/// Resolves bare package specifiers (`react`, `lodash/fp`) to URLs.
pub trait PackageResolver: Send + Sync + Debug {
    fn resolve_package_import(&self, specifier: &str) -> Option<String>;
}

/// Browser import map (`{"imports": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportMap {
    #[serde(default)]
    pub imports: IndexMap<String, String>,
}

impl ImportMap {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

/// [`PackageResolver`] backed by an import map produced by an install step.
///
/// Keys match exactly, or as a prefix when they end with `/`. Relative targets
/// are joined onto `base_url`.
#[derive(Debug, Clone)]
pub struct ImportMapResolver {
    map: ImportMap,
    base_url: String,
}

impl ImportMapResolver {
    pub fn new(map: ImportMap, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { map, base_url }
    }

    fn absolutize(&self, target: &str) -> String {
        if target.starts_with('/') || has_protocol(target) {
            target.to_string()
        } else {
            format!(
                "{}{}",
                self.base_url,
                target.trim_start_matches("./")
            )
        }
    }
}

impl PackageResolver for ImportMapResolver {
    fn resolve_package_import(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.map.imports.get(specifier) {
            return Some(self.absolutize(target));
        }

        self.map
            .imports
            .iter()
            .filter(|(key, _)| key.ends_with('/') && specifier.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(key, target)| {
                let rest = &specifier[key.len()..];
                self.absolutize(&format!("{target}{rest}"))
            })
    }
}

/// Rewrites specifiers found in built modules.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    root: PathBuf,
    mounts: Arc<MountTable>,
    aliases: Vec<(String, String)>,
    externals: Vec<String>,
    packages: Option<Arc<dyn PackageResolver>>,
}

impl ImportResolver {
    pub fn new(root: impl Into<PathBuf>, mounts: Arc<MountTable>) -> Self {
        Self {
            root: root.into().clean(),
            mounts,
            aliases: Vec::new(),
            externals: Vec::new(),
            packages: None,
        }
    }

    pub fn with_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.aliases = aliases
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        // Longest key wins.
        self.aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn with_externals<I, S>(mut self, externals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.externals = externals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_package_resolver(mut self, packages: Arc<dyn PackageResolver>) -> Self {
        self.packages = Some(packages);
        self
    }

    /// Resolve `specifier` as imported from `context_file`.
    pub fn resolve(&self, specifier: &str, context_file: &Path) -> Resolution {
        if has_protocol(specifier) || specifier.contains(PROXY_MARKER) {
            return Resolution::Url(specifier.to_string());
        }
        if self.is_external(specifier) {
            return Resolution::Url(specifier.to_string());
        }

        if let Some(target) = self.apply_alias(specifier) {
            tracing::debug!(specifier, target, "applied alias");
            if is_relative(&target) {
                return self.resolve_file(&self.root.join(&target));
            }
            return self.resolve_non_relative(&target);
        }

        if is_relative(specifier) {
            let base = context_file.parent().unwrap_or(self.root.as_path());
            return self.resolve_file(&base.join(specifier));
        }

        self.resolve_non_relative(specifier)
    }

    fn resolve_non_relative(&self, specifier: &str) -> Resolution {
        if specifier.starts_with('/') || has_protocol(specifier) {
            return Resolution::Url(specifier.to_string());
        }
        match self
            .packages
            .as_ref()
            .and_then(|p| p.resolve_package_import(specifier))
        {
            Some(url) => Resolution::Url(url),
            None => Resolution::NotFound,
        }
    }

    fn is_external(&self, specifier: &str) -> bool {
        self.externals.iter().any(|ext| matches_prefix(specifier, ext))
    }

    fn apply_alias(&self, specifier: &str) -> Option<String> {
        self.aliases.iter().find_map(|(key, target)| {
            if !matches_prefix(specifier, key) {
                return None;
            }
            Some(format!("{target}{}", &specifier[key.len()..]))
        })
    }

    fn resolve_file(&self, path: &Path) -> Resolution {
        let path = path.clean();

        if let Some(found) = self.probe(&path) {
            return self.url_for_file(&found);
        }

        // Missing file with an explicit extension: best-effort URL, the
        // browser gets a 404 from the server.
        if file_extension(&path).is_some() {
            tracing::debug!(path = %path.display(), "relative import not found on disk");
            return self.url_for_file(&path);
        }

        Resolution::NotFound
    }

    fn probe(&self, path: &Path) -> Option<PathBuf> {
        if path.is_dir() {
            return self.probe_extensions(&path.join("index"));
        }
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        // `./a.js` may be served from `a.ts` or any other source that emits `.js`.
        if let Some(extension) = file_extension(path) {
            let extensions = self.mounts.extensions();
            for input in extensions.inputs_for(&extension) {
                let candidate = path.with_extension(input.trim_start_matches('.'));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        self.probe_extensions(path)
    }

    fn probe_extensions(&self, stem: &Path) -> Option<PathBuf> {
        let plugin_inputs = self.mounts.extensions().source_extensions();
        DEFAULT_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .chain(plugin_inputs)
            .map(|ext| append_extension(stem, &ext))
            .find(|candidate| candidate.is_file())
    }

    fn url_for_file(&self, path: &Path) -> Resolution {
        let Some(url) = self.mounts.url_for_source(path) else {
            tracing::warn!(path = %path.display(), "import resolves outside every mount");
            return Resolution::NotFound;
        };

        let needs_proxy = file_extension(Path::new(&url))
            .is_some_and(|ext| !is_script_extension(&ext));
        if needs_proxy {
            Resolution::Url(format!("{url}{PROXY_MARKER}"))
        } else {
            Resolution::Url(url)
        }
    }
}

fn append_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(extension);
    PathBuf::from(path)
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

fn matches_prefix(specifier: &str, key: &str) -> bool {
    specifier == key
        || specifier
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('/') || key.ends_with('/'))
}

/// `https://…`, `data:…`, `blob:…` and the like.
pub fn has_protocol(specifier: &str) -> bool {
    let Some((scheme, _)) = specifier.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
