//! Plugin contract.
//!
//! A plugin participates in up to two passes over a source file:
//!
//! - **load**: turn a raw source file with one of the `resolve.input`
//!   extensions into one or more outputs with `resolve.output` extensions.
//!   A plugin that declares `resolve` must also implement `load`, and the
//!   reverse.
//! - **transform**: rewrite the code of an existing output entry. Independent
//!   of `resolve`.
//!
//! Hook results are tagged enums; returning `None` means "not handled".

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::build_map::BuildMap;

/// Extensions a plugin loads from and produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveSpec {
    pub input: Vec<String>,
    pub output: Vec<String>,
}

impl ResolveSpec {
    pub fn new<I, O, S, T>(input: I, output: O) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            input: input.into_iter().map(Into::into).collect(),
            output: output.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, extension: &str) -> bool {
        self.input.iter().any(|ext| ext == extension)
    }

    pub fn declares_output(&self, extension: &str) -> bool {
        self.output.iter().any(|ext| ext == extension)
    }

    /// The first declared output; single-output loads are keyed by it.
    pub fn primary_output(&self) -> Option<&str> {
        self.output.first().map(String::as_str)
    }
}

/// Arguments to [`Plugin::load`].
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub path: &'a Path,
    /// Extension of the source file, with leading dot.
    pub extension: &'a str,
}

/// Arguments to [`Plugin::transform`].
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub path: &'a Path,
    /// Extension of the output entry being transformed.
    pub extension: &'a str,
    pub code: &'a [u8],
}

/// Result of a load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutput {
    /// One output, keyed by the plugin's first declared output extension.
    Single(Vec<u8>),
    /// Several outputs; every key must be a declared output extension.
    Multi(BuildMap),
    /// Not handled; the file is read as-is.
    None,
}

/// Result of a transform hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// New code. Any existing source map is discarded.
    Code(Vec<u8>),
    /// New code together with its own source map.
    WithMap { code: Vec<u8>, map: Vec<u8> },
    /// Leave the entry unchanged.
    None,
}

/// Failure reported by a plugin hook.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// A build plugin.
#[async_trait]
pub trait Plugin: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Extensions this plugin loads. Must be `Some` iff [`has_load`](Self::has_load).
    fn resolve(&self) -> Option<&ResolveSpec> {
        None
    }

    fn has_load(&self) -> bool {
        false
    }

    fn has_transform(&self) -> bool {
        false
    }

    async fn load(&self, _ctx: LoadContext<'_>) -> Result<LoadOutput, PluginError> {
        Ok(LoadOutput::None)
    }

    async fn transform(&self, _ctx: TransformContext<'_>) -> Result<TransformOutput, PluginError> {
        Ok(TransformOutput::None)
    }
}

pub type SharedPlugin = Arc<dyn Plugin>;
