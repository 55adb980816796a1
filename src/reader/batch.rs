//! Batch reads
//!
//! Resolves keys to offsets, sorts them ascending so reads sweep the file
//! front to back, then fans the work out to a scoped worker pool. Each
//! worker goes through the same permit gate as single reads.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel;

use crate::cancel::CancellationToken;
use crate::codec::RecordCodec;
use crate::error::{KeylineError, Result};
use crate::index::RecordKey;

use super::Reader;

impl<T, K, C> Reader<T, K, C>
where
    T: Send,
    K: RecordKey,
    C: RecordCodec<T>,
{
    /// Read every known key in `keys`.
    ///
    /// Unknown keys are dropped, and so are keys whose line is blank or fails
    /// to decode. `max_parallelism` defaults to the reader config. Result
    /// iteration order is unspecified.
    pub fn read_by_keys<I>(&self, keys: I, max_parallelism: Option<usize>) -> Result<HashMap<K, T>>
    where
        I: IntoIterator,
        I::Item: Borrow<K>,
    {
        self.read_by_keys_with_cancel(keys, max_parallelism, &CancellationToken::new())
    }

    /// [`read_by_keys`](Self::read_by_keys) observing `cancel`. Cancellation
    /// and I/O failures abort the whole batch.
    pub fn read_by_keys_with_cancel<I>(
        &self,
        keys: I,
        max_parallelism: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<K, T>>
    where
        I: IntoIterator,
        I::Item: Borrow<K>,
    {
        let workers = max_parallelism.unwrap_or(self.config.max_parallelism);
        if workers == 0 {
            return Err(KeylineError::Config(
                "max_parallelism must be greater than zero".to_string(),
            ));
        }

        // Repeated keys collapse here; distinct keys sharing an offset are
        // each read
        let mut seen = HashSet::new();
        let mut resolved: Vec<(K, u64)> = keys
            .into_iter()
            .filter_map(|key| {
                let key = key.borrow();
                let offset = self.index.lookup(key)?;
                seen.insert(key.clone()).then(|| (key.clone(), offset))
            })
            .collect();

        if resolved.is_empty() {
            return Ok(HashMap::new());
        }

        // Ascending offsets: dispatch order only, not result order
        resolved.sort_unstable_by_key(|&(_, offset)| offset);

        let workers = workers.min(resolved.len());
        tracing::debug!(keys = resolved.len(), workers, "dispatching batch read");

        if workers == 1 {
            let mut found = HashMap::with_capacity(resolved.len());
            for (key, offset) in resolved {
                cancel.check()?;
                if let Some(record) = self.read_lenient(offset, cancel)? {
                    found.insert(key, record);
                }
            }
            return Ok(found);
        }

        self.read_pooled(resolved, workers, cancel)
    }

    fn read_pooled(
        &self,
        resolved: Vec<(K, u64)>,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<K, T>> {
        let total = resolved.len();
        let (job_tx, job_rx) = channel::unbounded::<(K, u64)>();
        for job in resolved {
            // receiver is alive until the scope below ends
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let aborted = AtomicBool::new(false);

        let outcome = crossbeam::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let job_rx = job_rx.clone();
                    let aborted = &aborted;
                    scope.spawn(move |_| -> Result<HashMap<K, T>> {
                        let mut found = HashMap::new();
                        while let Ok((key, offset)) = job_rx.recv() {
                            if aborted.load(Ordering::Relaxed) {
                                break;
                            }
                            let result = cancel
                                .check()
                                .and_then(|_| self.read_lenient(offset, cancel));
                            match result {
                                Ok(Some(record)) => {
                                    found.insert(key, record);
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    aborted.store(true, Ordering::Relaxed);
                                    return Err(e);
                                }
                            }
                        }
                        Ok(found)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(KeylineError::WorkerPanic("batch read".to_string())))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| KeylineError::WorkerPanic("batch read".to_string()))?;

        let mut merged = HashMap::with_capacity(total);
        for partial in outcome {
            merged.extend(partial?);
        }
        Ok(merged)
    }

    /// Point read that turns a decode failure into `None`
    fn read_lenient(&self, offset: u64, cancel: &CancellationToken) -> Result<Option<T>> {
        match self.read_at(offset, cancel) {
            Ok(record) => Ok(Some(record)),
            Err(KeylineError::Decode { offset, reason }) => {
                tracing::warn!(offset, %reason, "skipping undecodable record in batch");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
