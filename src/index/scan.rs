//! Data file scan
//!
//! Rebuilds an index by walking the data file byte by byte. Offsets are
//! counted from raw bytes consumed, never from decoded text, so multi-byte
//! characters cannot skew them.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::cancel::CancellationToken;
use crate::codec::{decode_at, RecordCodec};
use crate::error::{KeylineError, Result};

use super::{IndexStore, RecordKey};

/// Read buffer for the scan; does not bound line length
const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Strip the `\n` terminator and one `\r` before it, if present
pub(crate) fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Whitespace-only lines are skipped, never indexed
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

impl<K: RecordKey> IndexStore<K> {
    /// Scan `data_path` from offset 0 and index every non-blank line by the
    /// key `key_fn` derives from its decoded record.
    ///
    /// A repeated key keeps the offset of its last occurrence.
    pub fn build_from_data<T, C, F>(data_path: &Path, codec: &C, key_fn: F) -> Result<Self>
    where
        C: RecordCodec<T> + ?Sized,
        F: Fn(&T) -> K,
    {
        Self::build_from_data_with_cancel(data_path, codec, key_fn, &CancellationToken::new())
    }

    /// [`build_from_data`](Self::build_from_data), checking `cancel` before each line
    pub fn build_from_data_with_cancel<T, C, F>(
        data_path: &Path,
        codec: &C,
        key_fn: F,
        cancel: &CancellationToken,
    ) -> Result<Self>
    where
        C: RecordCodec<T> + ?Sized,
        F: Fn(&T) -> K,
    {
        let file = match File::open(data_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KeylineError::not_found("Data file", data_path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, file);
        let mut store = Self::new();
        let mut line = Vec::with_capacity(1024);
        let mut offset: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            cancel.check()?;

            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }

            let line_start = offset;
            offset += read as u64;

            let content = trim_line(&line);
            if is_blank(content) {
                skipped += 1;
                continue;
            }

            let record: T = decode_at(codec, content, line_start)?;
            store.upsert(key_fn(&record), line_start);
        }

        tracing::debug!(
            path = %data_path.display(),
            entries = store.len(),
            blank_lines = skipped,
            bytes = offset,
            "index rebuilt from data file"
        );

        Ok(store)
    }
}
