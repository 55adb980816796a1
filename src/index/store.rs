//! IndexStore
//!
//! HashMap-backed key → offset map with JSON persistence.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::ser::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::config::{available_parallelism, DEFAULT_PARALLEL_RESTORE_THRESHOLD};
use crate::error::{KeylineError, Result};
use crate::paths;

use super::restore;
use super::{IndexEntry, IndexEntryRef, RecordKey};

/// In-memory index over one data file
///
/// ## Concurrency:
/// - Built single-threaded (writer session, restore, or scan)
/// - Read-only afterwards; `&IndexStore` is safe to share across threads
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStore<K: RecordKey> {
    entries: HashMap<K, u64>,
}

impl<K: RecordKey> Default for IndexStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RecordKey> IndexStore<K> {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite; the later offset wins
    pub fn upsert(&mut self, key: K, offset: u64) {
        self.entries.insert(key, offset);
    }

    /// Offset of the line holding `key`, if indexed
    pub fn lookup(&self, key: &K) -> Option<u64> {
        self.entries.get(key).copied()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// All indexed keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    /// All (key, offset) pairs, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry<K>> + '_ {
        self.entries.iter().map(|(key, &offset)| IndexEntry {
            key: key.clone(),
            offset,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every entry to `path` as a compact JSON array.
    ///
    /// The array is written to a `.tmp` sibling, synced, then renamed over
    /// `path`, so a reader never observes a half-written index.
    pub fn persist(&self, path: &Path) -> Result<()> {
        paths::ensure_parent_dir(path)?;
        let staging = paths::staging_path(path);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&staging)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, &PersistedEntries(&self.entries))
            .map_err(|e| KeylineError::Encode(format!("index serialization failed: {}", e)))?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| KeylineError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, path)?;

        tracing::debug!(entries = self.entries.len(), path = %path.display(), "index persisted");
        Ok(())
    }

    /// Load a persisted index, replacing current contents.
    ///
    /// Uses the default threshold for switching to parallel decoding.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        self.restore_with(path, DEFAULT_PARALLEL_RESTORE_THRESHOLD)
    }

    /// Load a persisted index; arrays with at least `parallel_threshold`
    /// entries are decoded by multiple workers.
    ///
    /// On any error the current contents are left untouched.
    pub fn restore_with(&mut self, path: &Path, parallel_threshold: usize) -> Result<()> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KeylineError::not_found("Index file", path));
            }
            Err(e) => return Err(e.into()),
        };

        // Structural pass only: split the array into raw elements
        let raw: Vec<&RawValue> = serde_json::from_slice(&bytes)
            .map_err(|e| KeylineError::malformed(path, format!("not a JSON array: {}", e)))?;

        let entries = if raw.len() >= parallel_threshold.max(1) {
            let workers = available_parallelism();
            tracing::debug!(entries = raw.len(), workers, "restoring index in parallel");
            restore::decode_parallel(&raw, workers, path)?
        } else {
            tracing::debug!(entries = raw.len(), "restoring index sequentially");
            restore::decode_sequential(&raw, path)?
        };

        self.entries = entries;
        Ok(())
    }

    /// Construct a store from a persisted index file
    pub fn load(path: &Path, parallel_threshold: usize) -> Result<Self> {
        let mut store = Self::new();
        store.restore_with(path, parallel_threshold)?;
        Ok(store)
    }
}

impl<K: RecordKey> FromIterator<(K, u64)> for IndexStore<K> {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (key, offset) in iter {
            store.upsert(key, offset);
        }
        store
    }
}

/// Serializes the map as `[{"key":..,"offset":..},...]` without copying it
struct PersistedEntries<'a, K>(&'a HashMap<K, u64>);

impl<K: Serialize> Serialize for PersistedEntries<'_, K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.0
                .iter()
                .map(|(key, &offset)| IndexEntryRef { key, offset }),
        )
    }
}
