//! Configuration for keyline
//!
//! Centralized configuration with sensible defaults.

use std::thread;

use crate::error::{KeylineError, Result};

/// Default write buffer capacity (128 KiB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 128 * 1024;

/// Default free-space margin that triggers a proactive flush (8 KiB)
pub const DEFAULT_FLUSH_MARGIN: usize = 8 * 1024;

/// Index size at which restore switches to parallel decoding
pub const DEFAULT_PARALLEL_RESTORE_THRESHOLD: usize = 1000;

/// Default capacity of the per-read line buffer (8 KiB)
pub const DEFAULT_LINE_BUFFER_CAPACITY: usize = 8 * 1024;

/// Number of hardware threads, falling back to 1 when unknown
pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// =============================================================================
// Writer Configuration
// =============================================================================

/// Configuration for a [`Writer`](crate::Writer) session
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Fixed capacity of the write buffer (in bytes).
    /// Records larger than this bypass the buffer entirely.
    pub buffer_capacity: usize,

    /// Flush the buffer once its free space drops below this many bytes
    pub flush_margin: usize,

    /// fsync the data file before persisting the index
    pub sync_on_finish: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_margin: DEFAULT_FLUSH_MARGIN,
            sync_on_finish: true,
        }
    }
}

impl WriterConfig {
    /// Create a new config builder
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }

    /// Reject settings the write loop cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(KeylineError::Config(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.flush_margin >= self.buffer_capacity {
            return Err(KeylineError::Config(format!(
                "flush_margin ({}) must be smaller than buffer_capacity ({})",
                self.flush_margin, self.buffer_capacity
            )));
        }
        Ok(())
    }
}

/// Builder for WriterConfig
#[derive(Default)]
pub struct WriterConfigBuilder {
    config: WriterConfig,
}

impl WriterConfigBuilder {
    /// Set the write buffer capacity (in bytes)
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.buffer_capacity = bytes;
        self
    }

    /// Set the proactive flush margin (in bytes)
    pub fn flush_margin(mut self, bytes: usize) -> Self {
        self.config.flush_margin = bytes;
        self
    }

    /// Enable or disable the final fsync
    pub fn sync_on_finish(mut self, sync: bool) -> Self {
        self.config.sync_on_finish = sync;
        self
    }

    pub fn build(self) -> WriterConfig {
        self.config
    }
}

// =============================================================================
// Reader Configuration
// =============================================================================

/// Configuration for a [`Reader`](crate::Reader)
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Max reads in flight at once across all callers of one Reader
    pub read_permits: usize,

    /// Default worker count for batch reads
    pub max_parallelism: usize,

    /// Persisted indexes with at least this many entries are decoded in parallel
    pub parallel_restore_threshold: usize,

    /// Initial capacity of the buffer a point read fills
    pub line_buffer_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let parallelism = available_parallelism();
        Self {
            read_permits: parallelism * 2,
            max_parallelism: parallelism,
            parallel_restore_threshold: DEFAULT_PARALLEL_RESTORE_THRESHOLD,
            line_buffer_capacity: DEFAULT_LINE_BUFFER_CAPACITY,
        }
    }
}

impl ReaderConfig {
    /// Create a new config builder
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_permits == 0 {
            return Err(KeylineError::Config(
                "read_permits must be greater than zero".to_string(),
            ));
        }
        if self.max_parallelism == 0 {
            return Err(KeylineError::Config(
                "max_parallelism must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for ReaderConfig
#[derive(Default)]
pub struct ReaderConfigBuilder {
    config: ReaderConfig,
}

impl ReaderConfigBuilder {
    /// Set the number of concurrent read permits
    pub fn read_permits(mut self, count: usize) -> Self {
        self.config.read_permits = count;
        self
    }

    /// Set the default batch worker count
    pub fn max_parallelism(mut self, count: usize) -> Self {
        self.config.max_parallelism = count;
        self
    }

    /// Set the entry count at which restore goes parallel
    pub fn parallel_restore_threshold(mut self, entries: usize) -> Self {
        self.config.parallel_restore_threshold = entries;
        self
    }

    /// Set the initial line buffer capacity (in bytes)
    pub fn line_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.line_buffer_capacity = bytes;
        self
    }

    pub fn build(self) -> ReaderConfig {
        self.config
    }
}
