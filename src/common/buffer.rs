//! Pooled handshake buffers.
//!
//! Every negotiation session reads through a fixed-size buffer acquired
//! from a shared pool. The buffer travels with the session and returns to
//! the pool when its guard drops, on success and failure alike.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Default handshake buffer size.
pub const HANDSHAKE_BUFFER_SIZE: usize = 4 * 1024;

/// Released buffers kept around; beyond this they are dropped.
const MAX_POOLED: usize = 64;

static SHARED_POOL: Lazy<Arc<BufferPool>> =
    Lazy::new(|| Arc::new(BufferPool::new(HANDSHAKE_BUFFER_SIZE)));

/// Pool of fixed-size byte buffers
pub struct BufferPool {
    free: Mutex<Vec<Box<[u8]>>>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
            buffer_size,
        }
    }

    /// Process-wide pool used when the caller does not supply one.
    pub fn shared() -> Arc<BufferPool> {
        SHARED_POOL.clone()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of released buffers currently held.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Take a buffer out of the pool, allocating when none is free.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size].into_boxed_slice());
        PooledBuffer {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    fn release(&self, buf: Box<[u8]>) {
        let mut free = self.free.lock();
        if free.len() < MAX_POOLED {
            free.push(buf);
        }
    }
}

/// Guard returning its buffer to the owning pool on drop
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => buf,
            None => &[],
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf,
            None => &mut [],
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
