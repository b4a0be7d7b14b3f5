//! redb-backed persistent build cache.
//!
//! One database file per cache directory. Entries are keyed by absolute
//! source path and hold the build together with the hash of the source it was
//! built from.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::entry::{CACHE_FORMAT_VERSION, CacheEntry};
use crate::error::CacheError;

/// Source path → bincode-encoded [`CacheEntry`].
const BUILDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("builds");

/// Persistent cache store using redb.
pub struct CacheStore {
    db: Database,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Open or create the store at `<cache_dir>/cache.redb`.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir)?;

        let db = Database::create(cache_dir.join("cache.redb"))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(BUILDS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Entry for `key`. `CacheMiss` if absent.
    pub fn get(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BUILDS_TABLE)?;

        let value = table.get(key)?.ok_or(CacheError::CacheMiss)?;

        let entry: CacheEntry = bincode::deserialize(value.value())
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;

        if !entry.metadata.is_compatible() {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: entry.metadata.format_version,
            });
        }

        Ok(entry)
    }

    pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let bytes =
            bincode::serialize(entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BUILDS_TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BUILDS_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BUILDS_TABLE)?;

        Ok(table.get(key)?.is_some())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.delete_table(BUILDS_TABLE)?;
            let _ = write_txn.open_table(BUILDS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BUILDS_TABLE)?;

        Ok(table.iter()?.count())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
