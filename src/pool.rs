//! Reusable output buffers.
//!
//! Every request captures its command's output into a [`BytesMut`]. Rather
//! than allocating a fresh one per request, buffers are borrowed from a
//! [`BufferPool`] and handed back when the request is done.
//!
//! The pool is an optimisation only. A buffer handed out is always empty,
//! and nothing depends on *which* buffer comes back or whether a released
//! one is ever reused: a pool that always allocated would behave the same,
//! just slower.
//!
//! Release is tied to [`PooledBuffer`]'s `Drop`, so it happens on every exit
//! path, including a request future that hyper drops when the client goes
//! away mid-request.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

/// Capacity of a freshly allocated buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Idle buffers kept by [`BufferPool::new`].
const DEFAULT_MAX_BUFFERS: usize = 128;

/// Buffers that grew past this are dropped on release instead of kept.
const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Lock-free pool of reusable [`BytesMut`] buffers.
pub struct BufferPool {
    idle: ArrayQueue<BytesMut>,
    max_retained_capacity: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    returns: AtomicUsize,
    drops: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BUFFERS, DEFAULT_MAX_RETAINED_CAPACITY)
    }

    /// Keeps at most `max_buffers` idle buffers, each no larger than
    /// `max_retained_capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `max_buffers` is zero.
    pub fn with_limits(max_buffers: usize, max_retained_capacity: usize) -> Self {
        Self {
            idle: ArrayQueue::new(max_buffers),
            max_retained_capacity,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            returns: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        }
    }

    /// Borrows an empty buffer. It goes back to `pool` when the guard drops.
    pub fn acquire(pool: &Arc<Self>) -> PooledBuffer {
        PooledBuffer { buf: Some(pool.take()), pool: Arc::clone(pool) }
    }

    fn take(&self) -> BytesMut {
        match self.idle.pop() {
            Some(mut buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                // A reused buffer still holds the previous request's bytes.
                buf.clear();
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY)
            }
        }
    }

    fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_retained_capacity {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buf.clear();

        if self.idle.push(buf).is_ok() {
            self.returns.fetch_add(1, Ordering::Relaxed);
        } else {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }

    /// Number of idle buffers.
    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }
}

impl Default for BufferPool {
    fn default() -> Self { Self::new() }
}

/// Snapshot of pool counters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolStats {
    /// Buffers currently idle in the pool.
    pub idle: usize,
    /// Acquisitions served by an idle buffer.
    pub hits: usize,
    /// Acquisitions that had to allocate.
    pub misses: usize,
    /// Releases that were kept for reuse.
    pub returns: usize,
    /// Releases that were discarded (pool full or buffer too large).
    pub drops: usize,
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    // Only `None` inside `drop`.
    buf: Option<BytesMut>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        self.buf.as_ref().unwrap_or_else(|| unreachable!("buffer taken before drop"))
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().unwrap_or_else(|| unreachable!("buffer taken before drop"))
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
