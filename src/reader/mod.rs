//! Reader Module
//!
//! Point and batch lookups by key over an immutable data file.
//!
//! ## Read Path
//! ```text
//! key ──► IndexStore::lookup ──► offset
//!                                  │
//!           acquire permit ◄───────┘
//!                 │
//!   open ──► seek(offset) ──► read one line ──► decode ──► close
//!                 │
//!           release permit (guard drop)
//! ```
//!
//! ## Concurrency:
//! - The index is loaded once at construction and never mutated afterwards
//! - Every read opens its own file handle: no shared cursor
//! - `ReadPermits` is the only state shared between concurrent calls

mod batch;
mod permit;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::codec::{decode_at, JsonCodec, RecordCodec};
use crate::config::ReaderConfig;
use crate::error::{KeylineError, Result};
use crate::index::{is_blank, trim_line, IndexStore, RecordKey};
use crate::paths;

pub use permit::PermitStats;
use permit::ReadPermits;

/// Key extractor used to rebuild the index from the data file
type KeyExtractor<T, K> = Box<dyn Fn(&T) -> K>;

enum IndexSource<T, K> {
    File(PathBuf),
    Scan(KeyExtractor<T, K>),
}

/// Random-access reader over one dataset
pub struct Reader<T, K: RecordKey, C = JsonCodec> {
    data_path: PathBuf,
    /// `None` when the index was rebuilt from the data file
    index_path: Option<PathBuf>,
    index: IndexStore<K>,
    codec: C,
    permits: ReadPermits,
    config: ReaderConfig,
    _record: PhantomData<fn() -> T>,
}

impl<T, K> Reader<T, K, JsonCodec>
where
    K: RecordKey,
    JsonCodec: RecordCodec<T>,
{
    /// Start configuring a reader for `data_path`
    pub fn builder(data_path: impl Into<PathBuf>) -> ReaderBuilder<T, K, JsonCodec> {
        ReaderBuilder {
            data_path: data_path.into(),
            index_path: None,
            key_fn: None,
            codec: JsonCodec,
            config: ReaderConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Open with the index at the derived sibling path
    pub fn open(data_path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(data_path).open()
    }
}

impl<T, K, C> Reader<T, K, C>
where
    K: RecordKey,
    C: RecordCodec<T>,
{
    /// Look up one record. An unknown key is `Ok(None)`, not an error.
    pub fn read_by_key(&self, key: &K) -> Result<Option<T>> {
        self.read_by_key_with_cancel(key, &CancellationToken::new())
    }

    pub fn read_by_key_with_cancel(&self, key: &K, cancel: &CancellationToken) -> Result<Option<T>> {
        match self.index.lookup(key) {
            Some(offset) => self.read_at(offset, cancel).map(Some),
            None => Ok(None),
        }
    }

    /// Read and decode the line starting at `offset`.
    ///
    /// Holds a permit from before the open until the decoded value is
    /// returned; the handle closes when `reader` drops.
    fn read_at(&self, offset: u64, cancel: &CancellationToken) -> Result<T> {
        cancel.check()?;
        let _permit = self.permits.acquire(cancel)?;

        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start(offset))?;
        cancel.check()?;

        let mut reader = BufReader::with_capacity(self.config.line_buffer_capacity, file);
        let mut line = Vec::with_capacity(self.config.line_buffer_capacity);
        let read = reader.read_until(b'\n', &mut line)?;
        drop(reader);

        let content = trim_line(&line);
        if read == 0 || is_blank(content) {
            return Err(KeylineError::Decode {
                offset,
                reason: "no record at offset".to_string(),
            });
        }

        decode_at(&self.codec, content, offset)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Index file in use, or `None` if the index was rebuilt from data
    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    pub fn index(&self) -> &IndexStore<K> {
        &self.index
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Indexed keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn permit_stats(&self) -> PermitStats {
        self.permits.stats()
    }
}

impl<T, K: RecordKey, C> fmt::Debug for Reader<T, K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("data_path", &self.data_path)
            .field("index_path", &self.index_path)
            .field("keys", &self.index.len())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures where a [`Reader`] gets its index from.
///
/// - neither `index_path` nor `key_extractor`: load the derived sibling index
/// - `index_path`: load that index file
/// - `key_extractor`: rebuild the index by scanning the data file
///
/// Setting both is a configuration error.
pub struct ReaderBuilder<T, K, C = JsonCodec> {
    data_path: PathBuf,
    index_path: Option<PathBuf>,
    key_fn: Option<KeyExtractor<T, K>>,
    codec: C,
    config: ReaderConfig,
    cancel: CancellationToken,
}

impl<T, K, C> ReaderBuilder<T, K, C>
where
    K: RecordKey,
    C: RecordCodec<T>,
{
    /// Load the index from an explicit path
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Rebuild the index at open time using this key extractor
    pub fn key_extractor<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&T) -> K + 'static,
    {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    /// Swap in a different record codec
    pub fn codec<C2: RecordCodec<T>>(self, codec: C2) -> ReaderBuilder<T, K, C2> {
        ReaderBuilder {
            data_path: self.data_path,
            index_path: self.index_path,
            key_fn: self.key_fn,
            codec,
            config: self.config,
            cancel: self.cancel,
        }
    }

    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Token observed while the index is loaded or rebuilt
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate paths, then load or rebuild the index.
    ///
    /// All path checks happen before any index work starts.
    pub fn open(self) -> Result<Reader<T, K, C>> {
        self.config.validate()?;

        let source = match (self.index_path, self.key_fn) {
            (Some(_), Some(_)) => {
                return Err(KeylineError::Config(
                    "an explicit index path and a key extractor are mutually exclusive"
                        .to_string(),
                ));
            }
            (Some(path), None) => IndexSource::File(path),
            (None, None) => IndexSource::File(paths::default_index_path(&self.data_path)),
            (None, Some(key_fn)) => IndexSource::Scan(key_fn),
        };

        if let IndexSource::File(index_path) = &source {
            paths::ensure_distinct(&self.data_path, index_path)?;
        }
        paths::ensure_file("Data file", &self.data_path)?;
        if let IndexSource::File(index_path) = &source {
            paths::ensure_file("Index file", index_path)?;
        }

        let started = Instant::now();
        let (index, index_path) = match source {
            IndexSource::File(path) => {
                self.cancel.check()?;
                let index = IndexStore::load(&path, self.config.parallel_restore_threshold)?;
                (index, Some(path))
            }
            IndexSource::Scan(key_fn) => {
                let index = IndexStore::build_from_data_with_cancel(
                    &self.data_path,
                    &self.codec,
                    key_fn,
                    &self.cancel,
                )?;
                (index, None)
            }
        };

        tracing::info!(
            data = %self.data_path.display(),
            source = if index_path.is_some() { "index file" } else { "data scan" },
            keys = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reader opened"
        );

        Ok(Reader {
            data_path: self.data_path,
            index_path,
            index,
            codec: self.codec,
            permits: ReadPermits::new(self.config.read_permits),
            config: self.config,
            _record: PhantomData,
        })
    }
}
