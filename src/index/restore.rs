//! Index restore
//!
//! Decodes raw index array elements into a map, sequentially or with a
//! pool of scoped workers decoding one chunk each.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::value::RawValue;

use crate::error::{KeylineError, Result};

use super::{IndexEntry, RecordKey};

fn decode_entry<K: RecordKey>(raw: &RawValue, position: usize, path: &Path) -> Result<IndexEntry<K>> {
    serde_json::from_str(raw.get())
        .map_err(|e| KeylineError::malformed(path, format!("entry {}: {}", position, e)))
}

pub(super) fn decode_sequential<K: RecordKey>(
    raw: &[&RawValue],
    path: &Path,
) -> Result<HashMap<K, u64>> {
    let mut entries = HashMap::with_capacity(raw.len());
    for (position, element) in raw.iter().enumerate() {
        let entry: IndexEntry<K> = decode_entry(element, position, path)?;
        entries.insert(entry.key, entry.offset);
    }
    Ok(entries)
}

/// Split `raw` into one chunk per worker. Each worker decodes its chunk
/// locally; chunks are merged in array order afterwards, so a repeated key
/// keeps its last occurrence exactly as the sequential path does. The first
/// failure flags the others to stop early.
pub(super) fn decode_parallel<K: RecordKey>(
    raw: &[&RawValue],
    workers: usize,
    path: &Path,
) -> Result<HashMap<K, u64>> {
    let workers = workers.clamp(1, raw.len().max(1));
    let chunk_size = raw.len().div_ceil(workers).max(1);
    let failed = AtomicBool::new(false);

    let outcome = crossbeam::scope(|scope| {
        let handles: Vec<_> = raw
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let failed = &failed;
                scope.spawn(move |_| -> Result<Vec<IndexEntry<K>>> {
                    let base = chunk_idx * chunk_size;
                    let mut local = Vec::with_capacity(chunk.len());
                    for (i, element) in chunk.iter().enumerate() {
                        if failed.load(Ordering::Relaxed) {
                            break;
                        }
                        match decode_entry::<K>(element, base + i, path) {
                            Ok(entry) => local.push(entry),
                            Err(e) => {
                                failed.store(true, Ordering::Relaxed);
                                return Err(e);
                            }
                        }
                    }
                    Ok(local)
                })
            })
            .collect();

        // joined in chunk order
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(KeylineError::WorkerPanic("index restore".to_string())))
            })
            .collect::<Vec<_>>()
    })
    .map_err(|_| KeylineError::WorkerPanic("index restore".to_string()))?;

    // Any failure, lowest chunk first, before merging anything
    let chunks = outcome.into_iter().collect::<Result<Vec<_>>>()?;

    let mut entries = HashMap::with_capacity(raw.len());
    for entry in chunks.into_iter().flatten() {
        entries.insert(entry.key, entry.offset);
    }
    Ok(entries)
}
