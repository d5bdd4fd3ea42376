//! Per-connection negotiation state

use super::buffer::{BufferPool, PooledBuffer};
use std::net::SocketAddr;
use std::sync::Arc;

/// Mutable state of one handshake, created on accept and alive until the
/// session is handed off or rejected. The pooled buffer is tied to the
/// session's scope and returns to the pool with it on every exit path.
pub struct NegotiationSession {
    buffer: PooledBuffer,
    peer: SocketAddr,
    bytes_read: usize,
    chosen_method: Option<u8>,
    target: Option<(String, u16)>,
}

impl NegotiationSession {
    pub fn new(pool: &Arc<BufferPool>, peer: SocketAddr) -> Self {
        NegotiationSession {
            buffer: pool.acquire(),
            peer,
            bytes_read: 0,
            chosen_method: None,
            target: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Total bytes consumed from the client so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn record_read(&mut self, n: usize) {
        self.bytes_read += n;
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Authentication method accepted during the SOCKS5 greeting.
    pub fn chosen_method(&self) -> Option<u8> {
        self.chosen_method
    }

    pub fn set_chosen_method(&mut self, method: u8) {
        self.chosen_method = Some(method);
    }

    pub fn target(&self) -> Option<(&str, u16)> {
        self.target.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    pub fn set_target(&mut self, host: String, port: u16) {
        self.target = Some((host, port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle_returns_buffer() {
        let pool = Arc::new(BufferPool::new(128));
        let peer = "127.0.0.1:40000".parse().unwrap();
        {
            let mut session = NegotiationSession::new(&pool, peer);
            session.record_read(7);
            session.set_target("example.com".to_string(), 443);
            assert_eq!(session.bytes_read(), 7);
            assert_eq!(session.target(), Some(("example.com", 443)));
        }
        assert_eq!(pool.available(), 1);
    }
}
