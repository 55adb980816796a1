//! Writer Module
//!
//! Streams records to a data file while building the key → offset index.
//!
//! ## Responsibilities
//! - One compact JSON line per record, `\n` terminated
//! - Exact byte accounting: offset(Rn+1) = offset(Rn) + len(Rn) + 1
//! - Bounded buffering with a bypass for records larger than the buffer
//! - Persist the index only after the data file is durable
//!
//! ## Session Outcome
//! ```text
//! success:            data file complete  + index file present
//! error / cancelled:  data file truncated + no index file
//! ```

mod buffer;

use std::borrow::Borrow;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::codec::{JsonCodec, RecordCodec};
use crate::config::WriterConfig;
use crate::error::{KeylineError, Result};
use crate::index::{IndexStore, RecordKey};
use crate::paths;

use buffer::LineSink;

/// Outcome of a completed write session
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Records written, duplicates included
    pub records: u64,
    /// Distinct keys in the persisted index
    pub keys: usize,
    /// Size of the data file in bytes
    pub bytes: u64,
    pub data_path: PathBuf,
    pub index_path: PathBuf,
}

/// Writes a dataset and its index in one session
///
/// `&mut self` on every write method: one session per Writer at a time.
pub struct Writer<T, K, F, C = JsonCodec> {
    key_fn: F,
    codec: C,
    config: WriterConfig,
    /// Reused encode buffer
    scratch: Vec<u8>,
    _marker: PhantomData<fn(&T) -> K>,
}

impl<T, K, F> Writer<T, K, F, JsonCodec>
where
    K: RecordKey,
    F: Fn(&T) -> K,
    JsonCodec: RecordCodec<T>,
{
    /// Writer using the JSON codec and default config
    pub fn new(key_fn: F) -> Self {
        Self::with_codec(key_fn, JsonCodec)
    }
}

impl<T, K, F, C> Writer<T, K, F, C>
where
    K: RecordKey,
    F: Fn(&T) -> K,
    C: RecordCodec<T>,
{
    pub fn with_codec(key_fn: F, codec: C) -> Self {
        Self {
            key_fn,
            codec,
            config: WriterConfig::default(),
            scratch: Vec::with_capacity(1024),
            _marker: PhantomData,
        }
    }

    /// Replace the writer config
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Write `records` to `data_path` and their index to `index_path`
    pub fn write<I>(&mut self, records: I, data_path: &Path, index_path: &Path) -> Result<WriteSummary>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        self.write_with_cancel(records, data_path, index_path, &CancellationToken::new())
    }

    /// Write to `data_path`, deriving the sibling index path
    pub fn write_to<I>(&mut self, records: I, data_path: &Path) -> Result<WriteSummary>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let index_path = paths::default_index_path(data_path);
        self.write(records, data_path, &index_path)
    }

    /// [`write`](Self::write), checking `cancel` before each record.
    ///
    /// Cancellation leaves a truncated data file and no index file.
    pub fn write_with_cancel<I>(
        &mut self,
        records: I,
        data_path: &Path,
        index_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        self.config.validate()?;
        paths::ensure_parent_dir(data_path)?;
        paths::ensure_parent_dir(index_path)?;
        paths::ensure_distinct(data_path, index_path)?;
        cancel.check()?;

        let started = Instant::now();

        // An index left over from an earlier session must not pair with a
        // data file this session fails to finish
        remove_if_exists(index_path)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(data_path)?;
        let mut sink = LineSink::new(file, self.config.buffer_capacity, self.config.flush_margin);

        let mut index = IndexStore::new();
        let mut records_written: u64 = 0;

        for item in records {
            cancel.check()?;
            let record = item.borrow();
            let key = (self.key_fn)(record);

            self.scratch.clear();
            self.codec.encode_into(record, &mut self.scratch)?;
            if self.scratch.contains(&b'\n') {
                return Err(KeylineError::Encode(format!(
                    "record {} encodes to more than one line",
                    records_written
                )));
            }
            self.scratch.push(b'\n');

            index.upsert(key, sink.offset());
            sink.append(&self.scratch)?;
            records_written += 1;
        }

        let (file, bytes) = sink.finish()?;
        if self.config.sync_on_finish {
            file.sync_all()?;
        }
        drop(file);

        cancel.check()?;
        index.persist(index_path)?;

        if index.len() as u64 != records_written {
            tracing::debug!(
                duplicates = records_written - index.len() as u64,
                "duplicate keys replaced earlier offsets"
            );
        }
        tracing::info!(
            records = records_written,
            keys = index.len(),
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            data = %data_path.display(),
            "write session complete"
        );

        Ok(WriteSummary {
            records: records_written,
            keys: index.len(),
            bytes,
            data_path: data_path.to_path_buf(),
            index_path: index_path.to_path_buf(),
        })
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
