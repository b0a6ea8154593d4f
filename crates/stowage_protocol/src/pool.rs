//! Reusable frame buffers.

use bytes::BytesMut;
use parking_lot::Mutex;

/// Initial capacity of a fresh pooled buffer.
pub const INITIAL_CAPACITY: usize = 1024;

/// Buffers that grew beyond this are dropped instead of pooled.
pub const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// A small pool of read/write buffers.
///
/// Buffers whose capacity has grown past [`MAX_POOLED_CAPACITY`] are not
/// retained, so one large frame does not pin memory for the pool's lifetime.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    max_buffers: usize,
}

impl BufferPool {
    /// Creates a pool that keeps at most `max_buffers` idle buffers.
    pub fn new(max_buffers: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_buffers)),
            max_buffers,
        }
    }

    /// Takes a cleared buffer from the pool or allocates one.
    pub fn get(&self) -> BytesMut {
        self.buffers
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(INITIAL_CAPACITY))
    }

    /// Returns a buffer to the pool.
    pub fn put(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_buffers {
            buffers.push(buf);
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_small_buffers() {
        let pool = BufferPool::new(4);
        let mut buf = pool.get();
        buf.extend_from_slice(b"abc");
        pool.put(buf);
        assert_eq!(pool.idle(), 1);
        assert!(pool.get().is_empty());
    }

    #[test]
    fn drops_large_buffers() {
        let pool = BufferPool::new(4);
        pool.put(BytesMut::with_capacity(MAX_POOLED_CAPACITY + 1));
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn bounded_idle_count() {
        let pool = BufferPool::new(1);
        pool.put(BytesMut::new());
        pool.put(BytesMut::new());
        assert_eq!(pool.idle(), 1);
    }
}
