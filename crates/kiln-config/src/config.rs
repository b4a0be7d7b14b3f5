//! Configuration types for the kiln dev server.
//!
//! Every field has a serde default, so an empty `kiln.config.json` (or none at
//! all) yields a working configuration that serves the project root at `/`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};

/// Default config file looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "kiln.config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Project root. Relative paths elsewhere in the config resolve against it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory → URL prefix. Empty means the root is served at `/`.
    #[serde(default)]
    pub mount: IndexMap<String, String>,

    /// Import specifier prefix → replacement (`"@app": "./src"`).
    #[serde(default)]
    pub alias: IndexMap<String, String>,

    /// Bare specifiers left untouched in served modules.
    #[serde(default)]
    pub external: Vec<String>,

    /// Import map produced by a package install step.
    #[serde(default)]
    pub import_map: Option<PathBuf>,

    /// URL that relative import map targets are served under.
    #[serde(default = "default_package_url")]
    pub package_url: String,

    #[serde(default)]
    pub dev: DevOptions,

    #[serde(default)]
    pub build: BuildOptions,

    #[serde(default)]
    pub cache: CacheOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevOptions {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub hmr: bool,

    /// WebSocket endpoint for HMR clients.
    #[serde(default = "default_hmr_path")]
    pub hmr_path: String,

    #[serde(default = "default_hmr_debounce_ms")]
    pub hmr_debounce_ms: u64,

    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Path components the watcher ignores.
    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Abort on the first plugin failure.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to `.kiln/cache` under the root.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A mount with its directory resolved against the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub dir: PathBuf,
    pub url: String,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            mount: IndexMap::new(),
            alias: IndexMap::new(),
            external: Vec::new(),
            import_map: None,
            package_url: default_package_url(),
            dev: DevOptions::default(),
            build: BuildOptions::default(),
            cache: CacheOptions::default(),
        }
    }
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hmr: true,
            hmr_path: default_hmr_path(),
            hmr_debounce_ms: default_hmr_debounce_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            watch_ignore: default_watch_ignore(),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            fail_fast: true,
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl KilnConfig {
    /// Resolve `path` against the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        self.root.join(path).clean()
    }

    /// Mounts with absolute directories. The root at `/` when none are set.
    pub fn resolved_mounts(&self) -> Vec<ResolvedMount> {
        if self.mount.is_empty() {
            return vec![ResolvedMount {
                dir: self.root.clone(),
                url: "/".to_string(),
            }];
        }

        self.mount
            .iter()
            .map(|(dir, url)| ResolvedMount {
                dir: self.resolve_path(Path::new(dir)),
                url: url.clone(),
            })
            .collect()
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache.dir {
            Some(dir) => self.resolve_path(dir),
            None => self.root.join(".kiln").join("cache"),
        }
    }

    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.build.out_dir)
    }

    pub fn import_map_path(&self) -> Option<PathBuf> {
        self.import_map.as_deref().map(|path| self.resolve_path(path))
    }

    /// `host:port` for the dev server listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.dev.host, self.dev.port)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_package_url() -> String {
    "/web_modules".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_hmr_path() -> String {
    "/__kiln__/hmr".to_string()
}

fn default_hmr_debounce_ms() -> u64 {
    50
}

fn default_watch_debounce_ms() -> u64 {
    100
}

fn default_watch_ignore() -> Vec<String> {
    ["node_modules", ".git", ".kiln", "dist"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}
