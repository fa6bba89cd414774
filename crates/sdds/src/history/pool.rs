// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Payload buffer pools backing writer histories.
//!
//! The strategy is fixed at history construction:
//! - `Preallocated`: fixed-size buffers, a request above the configured
//!   payload size fails.
//! - `PreallocatedWithRealloc`: fixed-size buffers that grow on demand.
//! - `Dynamic`: every reservation allocates exactly what was asked.

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Buffer allocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolStrategy {
    Preallocated,
    #[default]
    PreallocatedWithRealloc,
    Dynamic,
}

/// Pool of payload buffers sized by history QoS.
pub struct PayloadPool {
    strategy: PoolStrategy,
    payload_size: usize,
    max_buffers: usize,
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: Mutex<usize>,
}

impl PayloadPool {
    /// Create a pool. `initial` buffers are carved out up front for the
    /// preallocated strategies.
    #[must_use]
    pub fn new(strategy: PoolStrategy, payload_size: usize, initial: usize, max_buffers: usize) -> Self {
        let free = match strategy {
            PoolStrategy::Dynamic => Vec::new(),
            _ => (0..initial.min(max_buffers))
                .map(|_| vec![0u8; payload_size])
                .collect(),
        };
        Self {
            strategy,
            payload_size,
            max_buffers,
            free: Mutex::new(free),
            outstanding: Mutex::new(0),
        }
    }

    /// Acquire a buffer of at least `len` bytes.
    pub fn reserve(&self, len: usize) -> Result<Vec<u8>> {
        if self.strategy == PoolStrategy::Preallocated && len > self.payload_size {
            return Err(Error::OutOfResources(format!(
                "payload {} exceeds preallocated size {}",
                len, self.payload_size
            )));
        }

        let mut outstanding = self.outstanding.lock();
        if *outstanding >= self.max_buffers {
            return Err(Error::OutOfResources("payload pool exhausted".into()));
        }

        let mut buf = match self.free.lock().pop() {
            Some(buf) => buf,
            None => match self.strategy {
                PoolStrategy::Dynamic => Vec::with_capacity(len),
                _ => vec![0u8; self.payload_size],
            },
        };
        if buf.len() < len {
            match self.strategy {
                PoolStrategy::Preallocated => {
                    // Already checked above; kept as a guard for reused
                    // buffers shrunk by a caller.
                    buf.resize(self.payload_size, 0);
                }
                _ => buf.resize(len, 0),
            }
        }
        *outstanding += 1;
        Ok(buf)
    }

    /// Return a buffer to the pool.
    pub fn release(&self, buf: Vec<u8>) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if self.strategy != PoolStrategy::Dynamic {
            self.free.lock().push(buf);
        }
    }

    /// Buffers currently handed out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preallocated_rejects_oversize() {
        let pool = PayloadPool::new(PoolStrategy::Preallocated, 64, 2, 4);
        assert!(pool.reserve(65).is_err());
        assert!(pool.reserve(64).is_ok());
    }

    #[test]
    fn test_realloc_grows() {
        let pool = PayloadPool::new(PoolStrategy::PreallocatedWithRealloc, 16, 1, 4);
        let buf = pool.reserve(128).expect("realloc strategy grows");
        assert!(buf.len() >= 128);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = PayloadPool::new(PoolStrategy::Dynamic, 0, 0, 2);
        let a = pool.reserve(8).expect("first");
        let _b = pool.reserve(8).expect("second");
        assert!(matches!(pool.reserve(8), Err(Error::OutOfResources(_))));
        pool.release(a);
        assert!(pool.reserve(8).is_ok());
    }

    #[test]
    fn test_release_recycles() {
        let pool = PayloadPool::new(PoolStrategy::Preallocated, 32, 1, 2);
        let buf = pool.reserve(32).expect("reserve");
        pool.release(buf);
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.reserve(16).is_ok());
    }
}
