//! Persistent cache entry format.

use serde::{Deserialize, Serialize};

use crate::build_map::BuildMap;

/// Current cache format version. Increment when the entry layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// A finished build stored against the hash of the source it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,

    /// BLAKE3 hex hash of the raw source bytes (not of the output).
    pub original_file_hash: String,

    pub build: BuildMap,
}

impl CacheEntry {
    pub fn new(original_file_hash: impl Into<String>, build: BuildMap) -> Self {
        Self {
            metadata: CacheMetadata::new(),
            original_file_hash: original_file_hash.into(),
            build,
        }
    }

    /// Still valid for a source file whose current hash is `hash`.
    pub fn matches(&self, hash: &str) -> bool {
        self.original_file_hash == hash
    }
}

/// Cache metadata for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// kiln-build version that wrote the entry.
    pub kiln_version: String,

    pub format_version: u32,

    /// Unix timestamp when the entry was written.
    pub created_at: u64,
}

impl CacheMetadata {
    pub fn new() -> Self {
        Self {
            kiln_version: env!("CARGO_PKG_VERSION").to_string(),
            format_version: CACHE_FORMAT_VERSION,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.format_version == CACHE_FORMAT_VERSION
    }
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// BLAKE3 hex digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
