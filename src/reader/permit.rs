//! Read permits
//!
//! Counting gate that caps the number of point reads in flight. Waiters
//! wake on release or every [`WAIT_SLICE`] to re-check their cancellation
//! token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancellationToken;
use crate::error::Result;

/// Upper bound on how long a waiter sleeps before re-checking cancellation
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Snapshot of permit usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitStats {
    pub total: usize,
    pub available: usize,
    /// Highest number of permits held at once since creation
    pub peak_in_flight: usize,
}

pub(crate) struct ReadPermits {
    total: usize,
    available: Mutex<usize>,
    released: Condvar,
    peak: AtomicUsize,
}

impl ReadPermits {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            available: Mutex::new(total),
            released: Condvar::new(),
            peak: AtomicUsize::new(0),
        }
    }

    /// Block until a permit is free or `cancel` fires.
    ///
    /// The permit is returned when the guard drops, on every exit path.
    pub(crate) fn acquire(&self, cancel: &CancellationToken) -> Result<PermitGuard<'_>> {
        let mut available = self.available.lock();
        loop {
            cancel.check()?;
            if *available > 0 {
                *available -= 1;
                let in_flight = self.total - *available;
                self.peak.fetch_max(in_flight, Ordering::Relaxed);
                return Ok(PermitGuard { permits: self });
            }
            self.released.wait_for(&mut available, WAIT_SLICE);
        }
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        drop(available);
        self.released.notify_one();
    }

    pub(crate) fn stats(&self) -> PermitStats {
        PermitStats {
            total: self.total,
            available: *self.available.lock(),
            peak_in_flight: self.peak.load(Ordering::Relaxed),
        }
    }
}

/// Held for the duration of one point read
pub(crate) struct PermitGuard<'a> {
    permits: &'a ReadPermits,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        self.permits.release();
    }
}
