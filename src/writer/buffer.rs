//! Line sink
//!
//! Fixed-capacity write buffer in front of the data file that tracks the
//! exact number of bytes handed to it.

use std::io::{self, Write};

use bytes::BytesMut;

/// Buffers complete lines and counts the byte offset of the next one.
///
/// A line that does not fit in the remaining space forces a flush; a line
/// larger than the whole buffer is written straight through.
pub(crate) struct LineSink<W: Write> {
    inner: W,
    buffer: BytesMut,
    capacity: usize,
    flush_margin: usize,
    /// Bytes accepted so far == offset of the next line
    offset: u64,
    flushes: u64,
    direct_writes: u64,
}

impl<W: Write> LineSink<W> {
    pub(crate) fn new(inner: W, capacity: usize, flush_margin: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            flush_margin,
            offset: 0,
            flushes: 0,
            direct_writes: 0,
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.buffer.len())
    }

    /// Accept one terminated line
    pub(crate) fn append(&mut self, line: &[u8]) -> io::Result<()> {
        if line.len() <= self.remaining() {
            self.buffer.extend_from_slice(line);
        } else {
            self.flush_buffer()?;
            if line.len() > self.capacity {
                self.inner.write_all(line)?;
                self.direct_writes += 1;
            } else {
                self.buffer.extend_from_slice(line);
            }
        }

        self.offset += line.len() as u64;

        if self.remaining() < self.flush_margin {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        self.flushes += 1;
        Ok(())
    }

    /// Drain the buffer and hand back the writer with the total byte count
    pub(crate) fn finish(mut self) -> io::Result<(W, u64)> {
        self.flush_buffer()?;
        self.inner.flush()?;
        tracing::debug!(
            bytes = self.offset,
            flushes = self.flushes,
            direct_writes = self.direct_writes,
            "line sink drained"
        );
        Ok((self.inner, self.offset))
    }
}
