//! Shared test utilities for kiln-build tests.
//!
//! Fixture projects live in temporary directories; plugins record how often
//! they ran so tests can assert on pipeline executions.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kiln_build::{
    LoadContext, LoadOutput, Plugin, PluginError, ResolveSpec, SharedPlugin, TransformContext,
    TransformOutput, async_trait,
};
use parking_lot::Mutex;
use tempfile::TempDir;

/// A throwaway project directory.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }
}

/// Loads `.x` files into `.js`, prefixing the source with a configurable
/// string, after an optional delay.
#[derive(Debug, Clone)]
pub struct CountingPlugin {
    spec: ResolveSpec,
    pub runs: Arc<AtomicUsize>,
    pub prefix: Arc<Mutex<String>>,
    delay: Duration,
}

impl CountingPlugin {
    pub fn new(input: &str, output: &str) -> Self {
        Self {
            spec: ResolveSpec::new([input], [output]),
            runs: Arc::new(AtomicUsize::new(0)),
            prefix: Arc::new(Mutex::new(String::new())),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn set_prefix(&self, prefix: &str) {
        *self.prefix.lock() = prefix.to_string();
    }

    pub fn shared(&self) -> SharedPlugin {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Plugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    fn resolve(&self) -> Option<&ResolveSpec> {
        Some(&self.spec)
    }

    fn has_load(&self) -> bool {
        true
    }

    async fn load(&self, ctx: LoadContext<'_>) -> Result<LoadOutput, PluginError> {
        let source = tokio::fs::read_to_string(ctx.path).await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        let prefix = self.prefix.lock().clone();
        Ok(LoadOutput::Single(format!("{prefix}{source}").into_bytes()))
    }
}

/// Returns a fixed string for every file it loads.
#[derive(Debug)]
pub struct FixedPlugin {
    spec: ResolveSpec,
    output: LoadOutput,
}

impl FixedPlugin {
    pub fn single(input: &str, output: &str, code: &str) -> SharedPlugin {
        Arc::new(Self {
            spec: ResolveSpec::new([input], [output]),
            output: LoadOutput::Single(code.as_bytes().to_vec()),
        })
    }

    pub fn with_output(spec: ResolveSpec, output: LoadOutput) -> SharedPlugin {
        Arc::new(Self { spec, output })
    }
}

#[async_trait]
impl Plugin for FixedPlugin {
    fn name(&self) -> &str {
        "fixed"
    }

    fn resolve(&self) -> Option<&ResolveSpec> {
        Some(&self.spec)
    }

    fn has_load(&self) -> bool {
        true
    }

    async fn load(&self, _ctx: LoadContext<'_>) -> Result<LoadOutput, PluginError> {
        Ok(self.output.clone())
    }
}

/// Appends `/* <ext> */` to every output entry.
#[derive(Debug)]
pub struct TagPlugin {
    pub with_map: bool,
}

#[async_trait]
impl Plugin for TagPlugin {
    fn name(&self) -> &str {
        "tag"
    }

    fn has_transform(&self) -> bool {
        true
    }

    async fn transform(&self, ctx: TransformContext<'_>) -> Result<TransformOutput, PluginError> {
        let mut code = ctx.code.to_vec();
        code.extend_from_slice(format!("/* {} */", ctx.extension).as_bytes());
        if self.with_map {
            Ok(TransformOutput::WithMap {
                code,
                map: b"{\"version\":3}".to_vec(),
            })
        } else {
            Ok(TransformOutput::Code(code))
        }
    }
}

/// Every hook fails.
#[derive(Debug)]
pub struct FailingPlugin {
    spec: Option<ResolveSpec>,
    transform: bool,
}

impl FailingPlugin {
    pub fn load(input: &str, output: &str) -> SharedPlugin {
        Arc::new(Self {
            spec: Some(ResolveSpec::new([input], [output])),
            transform: false,
        })
    }

    pub fn transform() -> SharedPlugin {
        Arc::new(Self {
            spec: None,
            transform: true,
        })
    }
}

#[async_trait]
impl Plugin for FailingPlugin {
    fn name(&self) -> &str {
        "failing"
    }

    fn resolve(&self) -> Option<&ResolveSpec> {
        self.spec.as_ref()
    }

    fn has_load(&self) -> bool {
        self.spec.is_some()
    }

    fn has_transform(&self) -> bool {
        self.transform
    }

    async fn load(&self, _ctx: LoadContext<'_>) -> Result<LoadOutput, PluginError> {
        Err(PluginError::new("load exploded"))
    }

    async fn transform(&self, _ctx: TransformContext<'_>) -> Result<TransformOutput, PluginError> {
        Err(PluginError::new("transform exploded"))
    }
}

/// Declares a plugin shape without doing any work; for validation tests.
#[derive(Debug)]
pub struct ShapePlugin {
    pub spec: Option<ResolveSpec>,
    pub load: bool,
}

#[async_trait]
impl Plugin for ShapePlugin {
    fn name(&self) -> &str {
        "shape"
    }

    fn resolve(&self) -> Option<&ResolveSpec> {
        self.spec.as_ref()
    }

    fn has_load(&self) -> bool {
        self.load
    }
}
