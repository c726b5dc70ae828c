//! Buffer pool for recycling receive buffers across connections.
//!
//! Backed by `crossbeam_queue::ArrayQueue`. When the pool is empty `get()`
//! allocates; when it is full `put()` drops the buffer.

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

/// A bounded pool of `BytesMut` buffers.
///
/// Size it to the connection limit and the receive cap so that a steady
/// load never allocates.
pub struct BytesMutPool {
    pool: ArrayQueue<BytesMut>,
    default_capacity: usize,
}

impl BytesMutPool {
    /// Creates a new buffer pool.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0 or `default_capacity` is 0.
    pub fn new(pool_size: usize, default_capacity: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be positive");
        assert!(default_capacity > 0, "default_capacity must be positive");
        Self {
            pool: ArrayQueue::new(pool_size),
            default_capacity,
        }
    }

    /// Pops a recycled buffer or allocates one with the default capacity.
    pub fn get(&self) -> BytesMut {
        self.pool
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.default_capacity))
    }

    /// Clears `buf` and keeps it for reuse, unless the pool is full.
    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();
        let _ = self.pool.push(buf);
    }

    /// Buffers currently waiting in the pool.
    pub fn available(&self) -> usize {
        self.pool.len()
    }
}
