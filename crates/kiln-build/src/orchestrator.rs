//! Request-time build coordination.
//!
//! [`BuildOrchestrator`] sits between HTTP requests and the plugin pipeline:
//!
//! - concurrent requests for the same file share one pipeline run (`in_flight`)
//! - finished builds are kept in memory keyed by source path (`hot_cache`)
//! - a persistent store keyed by source path is trusted while the source hash
//!   matches, and re-verified in the background on every trusted hit
//! - built scripts have their imports rewritten and their edges recorded in
//!   the HMR graph

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use kiln_graph::{DEFAULT_DEBOUNCE, HmrEngine};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::build_map::{BuildMap, file_extension, is_script_extension};
use crate::cache::{CacheEntry, CacheStore, content_hash};
use crate::error::{BuildError, CacheError, PipelineError};
use crate::imports::rewrite_imports;
use crate::mount::{Mount, MountTable, RequestTarget, strip_query};
use crate::pipeline::{FailurePolicy, PluginPipeline};
use crate::plugin::SharedPlugin;
use crate::proxy::{asset_proxy, content_type, css_proxy, hmr_prelude, inject_hmr_client, json_proxy};
use crate::resolver::{ImportResolver, PROXY_MARKER, PackageResolver, Resolution};

type SharedBuild = Shared<BoxFuture<'static, Result<Arc<BuildMap>, BuildError>>>;

/// A running build and the id that owns its `in_flight` slot.
struct InFlight {
    id: u64,
    build: SharedBuild,
}

/// A file system event reported by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created(path) | FileChange::Modified(path) | FileChange::Removed(path) => {
                path
            }
        }
    }
}

/// A finalized response body for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub url: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Quoted strong validator for `ETag`/`If-None-Match`.
    pub etag: String,
}

/// Builder for [`BuildOrchestrator`].
pub struct BuildOrchestratorBuilder {
    root: PathBuf,
    mounts: Vec<Mount>,
    plugins: Vec<SharedPlugin>,
    policy: FailurePolicy,
    aliases: Vec<(String, String)>,
    externals: Vec<String>,
    packages: Option<Arc<dyn PackageResolver>>,
    store: Option<Arc<CacheStore>>,
    hmr: Option<Arc<HmrEngine>>,
    hmr_enabled: bool,
    hmr_debounce: Duration,
}

impl BuildOrchestratorBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounts: Vec::new(),
            plugins: Vec::new(),
            policy: FailurePolicy::default(),
            aliases: Vec::new(),
            externals: Vec::new(),
            packages: None,
            store: None,
            hmr: None,
            hmr_enabled: true,
            hmr_debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Serve `dir` (relative to the root, or absolute) under `url`.
    pub fn mount(mut self, dir: impl AsRef<Path>, url: impl AsRef<str>) -> Self {
        let dir = self.root.join(dir.as_ref());
        self.mounts.push(Mount::new(dir, url));
        self
    }

    /// Register a plugin. Plugins run in registration order.
    pub fn plugin(mut self, plugin: SharedPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.push((from.into(), to.into()));
        self
    }

    pub fn external(mut self, package: impl Into<String>) -> Self {
        self.externals.push(package.into());
        self
    }

    pub fn package_resolver(mut self, packages: Arc<dyn PackageResolver>) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn cache_store(mut self, store: Arc<CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing engine instead of creating one.
    pub fn hmr_engine(mut self, engine: Arc<HmrEngine>) -> Self {
        self.hmr = Some(engine);
        self
    }

    /// Inject the HMR prelude and client. On by default.
    pub fn hmr(mut self, enabled: bool) -> Self {
        self.hmr_enabled = enabled;
        self
    }

    pub fn hmr_debounce(mut self, debounce: Duration) -> Self {
        self.hmr_debounce = debounce;
        self
    }

    /// Validate the plugins and assemble the orchestrator.
    ///
    /// Creates an [`HmrEngine`] when none was supplied, which requires a Tokio
    /// runtime. Without any mount the root is served at `/`.
    pub fn build(self) -> Result<BuildOrchestrator, PipelineError> {
        let pipeline = Arc::new(PluginPipeline::new(self.plugins, self.policy)?);

        let mounts = if self.mounts.is_empty() {
            vec![Mount::new(&self.root, "/")]
        } else {
            self.mounts
        };
        let mounts = Arc::new(MountTable::new(mounts, pipeline.extension_map()));

        let mut resolver = ImportResolver::new(&self.root, mounts.clone())
            .with_aliases(self.aliases)
            .with_externals(self.externals);
        if let Some(packages) = self.packages {
            resolver = resolver.with_package_resolver(packages);
        }

        let hmr = self
            .hmr
            .unwrap_or_else(|| HmrEngine::new(self.hmr_debounce));

        Ok(BuildOrchestrator {
            inner: Arc::new(Inner {
                pipeline,
                mounts,
                resolver,
                hmr,
                hmr_enabled: self.hmr_enabled,
                hot_cache: DashMap::new(),
                in_flight: Mutex::new(FxHashMap::default()),
                next_build_id: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                generations: DashMap::new(),
                store: self.store,
            }),
        })
    }
}

struct Inner {
    pipeline: Arc<PluginPipeline>,
    mounts: Arc<MountTable>,
    resolver: ImportResolver,
    hmr: Arc<HmrEngine>,
    hmr_enabled: bool,
    hot_cache: DashMap<PathBuf, Arc<BuildMap>>,
    in_flight: Mutex<FxHashMap<PathBuf, InFlight>>,
    next_build_id: AtomicU64,
    /// Bumped by `invalidate_all`.
    epoch: AtomicU64,
    /// Bumped per path by `invalidate`.
    generations: DashMap<PathBuf, u64>,
    store: Option<Arc<CacheStore>>,
}

impl Inner {
    fn generation(&self, path: &Path) -> (u64, u64) {
        let per_path = self.generations.get(path).map(|g| *g).unwrap_or(0);
        (self.epoch.load(Ordering::Acquire), per_path)
    }
}

/// One dev server's build state. Cheap to clone.
#[derive(Clone)]
pub struct BuildOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("hot_cache", &self.inner.hot_cache.len())
            .field("in_flight", &self.inner.in_flight.lock().len())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}

impl BuildOrchestrator {
    pub fn builder(root: impl Into<PathBuf>) -> BuildOrchestratorBuilder {
        BuildOrchestratorBuilder::new(root)
    }

    pub fn hmr(&self) -> &Arc<HmrEngine> {
        &self.inner.hmr
    }

    pub fn mounts(&self) -> &MountTable {
        &self.inner.mounts
    }

    pub fn resolver(&self) -> &ImportResolver {
        &self.inner.resolver
    }

    pub fn pipeline(&self) -> &PluginPipeline {
        &self.inner.pipeline
    }

    /// True if a finished build of `path` is held in memory.
    pub fn is_hot(&self, path: &Path) -> bool {
        self.inner.hot_cache.contains_key(path)
    }

    /// Every URL `path` is served under.
    pub fn urls_for_source(&self, path: &Path) -> Vec<String> {
        self.inner.mounts.urls_for_source(path)
    }

    /// Build `path`, sharing the run with any concurrent caller.
    ///
    /// The build runs on its own task, so it finishes and populates the hot
    /// cache even if every caller goes away. Failures are shared with every
    /// waiter and never cached.
    pub async fn build(&self, path: &Path) -> Result<Arc<BuildMap>, BuildError> {
        let shared = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(path) {
                Some(existing) => {
                    tracing::debug!(path = %path.display(), "joining in-flight build");
                    existing.build.clone()
                }
                None => {
                    let id = self.inner.next_build_id.fetch_add(1, Ordering::Relaxed);
                    let future = run_build(self.inner.clone(), path.to_path_buf(), id)
                        .boxed()
                        .shared();
                    in_flight.insert(
                        path.to_path_buf(),
                        InFlight {
                            id,
                            build: future.clone(),
                        },
                    );
                    tokio::spawn(future.clone());
                    future
                }
            }
        };
        shared.await
    }

    /// Resolve `url` to a response body.
    pub async fn serve(&self, url: &str) -> Result<ServedResponse, BuildError> {
        let target = self.inner.mounts.locate(url)?;
        self.inner.hmr.mark_entry_for_replacement(&target.url, false);

        let hot = self
            .inner
            .hot_cache
            .get(&target.source)
            .map(|entry| entry.value().clone());
        if let Some(build) = hot {
            tracing::debug!(url = %target.url, "hot cache hit");
            return self.finalize(&target, &build);
        }

        // Anything learned from these bytes is only cached while no change
        // to the file has been reported since.
        let generation = self.inner.generation(&target.source);
        let raw = tokio::fs::read(&target.source)
            .await
            .map_err(|err| BuildError::read(&target.source, err))?;
        let hash = content_hash(&raw);
        let key = cache_key(&target.source);

        if let Some(entry) = self.load_persistent(&key, &hash) {
            tracing::debug!(url = %target.url, "persistent cache hit, verifying in background");
            let trusted = Arc::new(entry.build);
            if self.inner.generation(&target.source) == generation {
                self.inner
                    .hot_cache
                    .insert(target.source.clone(), trusted.clone());
            }
            self.spawn_verify(target.source.clone(), trusted.clone());
            return self.finalize(&target, &trusted);
        }

        let build = self.build(&target.source).await?;
        if self.inner.generation(&target.source) == generation {
            self.store_persistent(key, hash, &build).await;
        } else {
            tracing::debug!(url = %target.url, "source changed while serving, not persisting");
        }
        self.finalize(&target, &build)
    }

    /// React to a watcher event.
    ///
    /// Caches are invalidated before this returns. HTML changes reload the page;
    /// any other file bubbles through the graph from each URL it is served
    /// under, if the browser has loaded it.
    pub fn on_file_change(&self, change: &FileChange) {
        let path = change.path();
        self.invalidate(path);

        if file_extension(path).as_deref() == Some(".html") {
            tracing::info!(path = %path.display(), "page changed, reloading");
            self.inner.hmr.broadcast_reload();
            return;
        }

        let mut notified = false;
        for url in self.inner.mounts.urls_for_source(path) {
            if self.inner.hmr.contains(&url) {
                self.inner.hmr.update_or_bubble(&url);
                notified = true;
            }
        }
        if !notified {
            tracing::debug!(path = %path.display(), "change to a module no client has loaded");
        }
    }

    /// Drop every cached build of `path`.
    ///
    /// A build still running on the old contents is detached: it finishes, but
    /// later requests start a new one instead of joining it.
    pub fn invalidate(&self, path: &Path) {
        *self.inner.generations.entry(path.to_path_buf()).or_insert(0) += 1;
        self.inner.in_flight.lock().remove(path);
        self.inner.hot_cache.remove(path);

        if let Some(store) = &self.inner.store {
            if let Err(err) = store.remove(&cache_key(path)) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove cache entry");
            }
        }
    }

    /// Drop every cached build, in memory and on disk.
    pub fn invalidate_all(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.in_flight.lock().clear();
        self.inner.hot_cache.clear();

        if let Some(store) = &self.inner.store {
            if let Err(err) = store.clear() {
                tracing::warn!(error = %err, "failed to clear persistent cache");
            }
        }
    }

    fn load_persistent(&self, key: &str, hash: &str) -> Option<CacheEntry> {
        let store = self.inner.store.as_ref()?;
        match store.get(key) {
            Ok(entry) if entry.matches(hash) => Some(entry),
            Ok(_) => {
                tracing::debug!(key, "persistent entry is stale");
                None
            }
            Err(CacheError::CacheMiss) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding unreadable cache entry");
                let _ = store.remove(key);
                None
            }
        }
    }

    async fn store_persistent(&self, key: String, hash: String, build: &BuildMap) {
        let Some(store) = self.inner.store.clone() else {
            return;
        };
        let entry = CacheEntry::new(&hash, build.clone());
        let write = tokio::task::spawn_blocking(move || {
            if let Err(err) = store.put(&key, &entry) {
                tracing::warn!(key = %key, error = %err, "failed to write cache entry");
            }
        });
        if let Err(err) = write.await {
            tracing::warn!(error = %err, "cache write task failed");
        }
    }

    /// Rebuild a trusted entry and reload every client if it was wrong.
    fn spawn_verify(&self, path: PathBuf, trusted: Arc<BuildMap>) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.build(&path).await {
                Ok(fresh) if *fresh == *trusted => {
                    tracing::debug!(path = %path.display(), "cached build verified");
                }
                Ok(_) => {
                    tracing::warn!(
                        path = %path.display(),
                        "cached build differs from a fresh build, clearing caches"
                    );
                    this.invalidate_all();
                    this.inner.hmr.broadcast_reload();
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "verification build failed");
                }
            }
        });
    }

    fn finalize(&self, target: &RequestTarget, build: &BuildMap) -> Result<ServedResponse, BuildError> {
        let output = build
            .get(&target.extension)
            .ok_or_else(|| BuildError::MissingOutput {
                path: target.source.clone(),
                extension: target.extension.clone(),
            })?;

        let (body, content_type) = if target.proxy {
            (self.proxy_module(target, &output.code).into_bytes(), content_type(".js"))
        } else if is_script_extension(&target.extension) {
            (self.finalize_script(target, &output.code), content_type(".js"))
        } else if target.extension == ".html" && self.inner.hmr_enabled {
            (inject_hmr_client(&output.code), content_type(".html"))
        } else {
            (output.code.clone(), content_type(&target.extension))
        };

        Ok(ServedResponse {
            url: target.url.clone(),
            content_type,
            etag: format!("\"{}\"", content_hash(&body)),
            body,
        })
    }

    fn proxy_module(&self, target: &RequestTarget, code: &[u8]) -> String {
        let hmr = &self.inner.hmr;
        match target.extension.as_str() {
            ".css" => {
                let hot = self.inner.hmr_enabled;
                hmr.set_entry(&target.url, Vec::<String>::new(), hot);
                if hot {
                    hmr.accept(&target.url);
                }
                css_proxy(code, hot)
            }
            ".json" => {
                hmr.set_entry(&target.url, Vec::<String>::new(), false);
                json_proxy(code)
            }
            _ => {
                hmr.set_entry(&target.url, Vec::<String>::new(), false);
                let asset_url = target
                    .url
                    .strip_suffix(PROXY_MARKER)
                    .unwrap_or(&target.url);
                asset_proxy(asset_url)
            }
        }
    }

    /// Rewrite imports, record graph edges and add the HMR prelude.
    fn finalize_script(&self, target: &RequestTarget, code: &[u8]) -> Vec<u8> {
        let Ok(text) = std::str::from_utf8(code) else {
            tracing::warn!(url = %target.url, "script is not valid UTF-8, serving as-is");
            return code.to_vec();
        };

        let mtime = now_millis();
        let mut imports = Vec::new();
        let rewritten = rewrite_imports(text, |spec| {
            match self.inner.resolver.resolve(&spec.specifier, &target.source) {
                Resolution::Url(url) => {
                    let mut resolved = url;
                    if resolved.starts_with('/') {
                        let key = strip_query(&resolved).to_string();
                        if self.inner.hmr.needs_replacement(&key) {
                            let sep = if resolved.contains('?') { '&' } else { '?' };
                            resolved = format!("{resolved}{sep}mtime={mtime}");
                        }
                        imports.push(key);
                    }
                    (resolved != spec.specifier).then_some(resolved)
                }
                Resolution::NotFound => {
                    tracing::warn!(
                        specifier = %spec.specifier,
                        importer = %target.url,
                        "could not resolve import"
                    );
                    None
                }
            }
        });

        let is_hmr_enabled = self.inner.hmr_enabled && rewritten.contains("import.meta.hot");
        self.inner.hmr.set_entry(&target.url, imports, is_hmr_enabled);

        if is_hmr_enabled {
            let mut with_prelude = hmr_prelude();
            with_prelude.push_str(&rewritten);
            with_prelude.into_bytes()
        } else {
            rewritten.into_bytes()
        }
    }
}

async fn run_build(inner: Arc<Inner>, path: PathBuf, id: u64) -> Result<Arc<BuildMap>, BuildError> {
    let generation = inner.generation(&path);
    let started = Instant::now();

    let result = inner
        .pipeline
        .build_file(&path)
        .await
        .map(Arc::new)
        .map_err(|source| BuildError::Pipeline {
            path: path.clone(),
            source: Arc::new(source),
        });

    match &result {
        Ok(build) => {
            if inner.generation(&path) == generation {
                inner.hot_cache.insert(path.clone(), build.clone());
            } else {
                tracing::debug!(path = %path.display(), "source changed during build, not caching");
            }
            tracing::info!(
                path = %path.display(),
                outputs = build.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "built"
            );
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "build failed");
        }
    }

    let mut in_flight = inner.in_flight.lock();
    if in_flight.get(&path).is_some_and(|slot| slot.id == id) {
        in_flight.remove(&path);
    }
    drop(in_flight);
    result
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
