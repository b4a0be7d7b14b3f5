//! Per-file build output keyed by output extension.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Extensions the browser can import directly without a proxy module.
pub const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs"];

/// True if `ext` (with leading dot) is natively importable.
pub fn is_script_extension(ext: &str) -> bool {
    SCRIPT_EXTENSIONS.contains(&ext)
}

/// Extension of `path` with its leading dot, e.g. `".js"`.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
}

/// Generated content for one output extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub code: Vec<u8>,
    pub source_map: Option<Vec<u8>>,
}

impl BuildOutput {
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            source_map: None,
        }
    }

    pub fn with_map(code: impl Into<Vec<u8>>, map: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            source_map: Some(map.into()),
        }
    }
}

/// Output extension → generated content, in the order the plugin produced them.
///
/// One source file may yield several entries (e.g. a component emitting both
/// `.js` and `.css`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMap(IndexMap<String, BuildOutput>);

impl BuildMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map with a single entry.
    pub fn single(extension: impl Into<String>, code: impl Into<Vec<u8>>) -> Self {
        let mut map = Self::new();
        map.insert(extension, BuildOutput::new(code));
        map
    }

    pub fn insert(&mut self, extension: impl Into<String>, output: BuildOutput) {
        self.0.insert(extension.into(), output);
    }

    pub fn get(&self, extension: &str) -> Option<&BuildOutput> {
        self.0.get(extension)
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains_key(extension)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuildOutput)> {
        self.0.iter().map(|(ext, out)| (ext.as_str(), out))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut BuildOutput)> {
        self.0.iter_mut().map(|(ext, out)| (ext.as_str(), out))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, BuildOutput)> for BuildMap {
    fn from_iter<T: IntoIterator<Item = (K, BuildOutput)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
