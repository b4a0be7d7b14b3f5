//! Persistent, content-addressed build cache.
//!
//! Entries survive restarts and are trusted only while the hash of the source
//! file still matches. See [`crate::BuildOrchestrator`] for how the in-memory
//! hot cache sits in front of it.

mod entry;
mod storage;

pub use entry::{CACHE_FORMAT_VERSION, CacheEntry, CacheMetadata, content_hash};
pub use storage::CacheStore;
