//! Transport traits for network communication
//!
//! The runtime never opens sockets. Users implement [`Connection`] for their
//! network stack (TCP, WebSocket, a relay...). [`MemoryConnection`] links two
//! endpoints in one process for tests and local play.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Network address type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Socket address (IP + port)
    Socket(SocketAddr),
    /// Custom address (WebSocket URL, relay id, in-process name)
    Custom(String),
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Address::Custom(addr.to_string())
    }
}

/// Connection-oriented transport (reliable and ordered, with an optional
/// unreliable channel)
pub trait Connection: Send + Sync {
    /// Error type for this connection
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send data reliably (guaranteed delivery, ordered)
    fn send_reliable(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Send data unreliably (best effort, may be reordered or lost)
    ///
    /// Transports without an unreliable channel fall back to reliable.
    fn send_unreliable(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receive data (non-blocking); `Ok(None)` when nothing is waiting
    fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Check if the connection is still alive
    fn is_connected(&self) -> bool;

    /// Get the remote address
    fn remote_addr(&self) -> Option<Address>;

    /// Close the connection gracefully
    fn close(&self) -> Result<(), Self::Error>;
}

/// Errors of [`MemoryConnection`]
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("connection closed")]
    Closed,
    #[error("connection queue poisoned")]
    Poisoned,
}

type Queue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// One end of an in-process connection
#[derive(Debug)]
pub struct MemoryConnection {
    inbox: Queue,
    outbox: Queue,
    open: Arc<AtomicBool>,
    peer: String,
}

impl MemoryConnection {
    /// Create two connected endpoints
    pub fn pair(a: &str, b: &str) -> (MemoryConnection, MemoryConnection) {
        let a_to_b: Queue = Arc::default();
        let b_to_a: Queue = Arc::default();
        let open = Arc::new(AtomicBool::new(true));
        (
            MemoryConnection {
                inbox: b_to_a.clone(),
                outbox: a_to_b.clone(),
                open: open.clone(),
                peer: b.to_string(),
            },
            MemoryConnection {
                inbox: a_to_b,
                outbox: b_to_a,
                open,
                peer: a.to_string(),
            },
        )
    }

    /// Number of packets waiting to be received on this end
    pub fn pending(&self) -> usize {
        self.inbox.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Drop the oldest waiting packet (simulates loss)
    pub fn drop_next(&self) -> bool {
        self.inbox
            .lock()
            .map(|mut q| q.pop_front().is_some())
            .unwrap_or(false)
    }
}

impl Connection for MemoryConnection {
    type Error = MemoryError;

    fn send_reliable(&self, data: &[u8]) -> Result<(), MemoryError> {
        if !self.is_connected() {
            return Err(MemoryError::Closed);
        }
        self.outbox
            .lock()
            .map_err(|_| MemoryError::Poisoned)?
            .push_back(data.to_vec());
        Ok(())
    }

    fn send_unreliable(&self, data: &[u8]) -> Result<(), MemoryError> {
        self.send_reliable(data)
    }

    fn recv(&self) -> Result<Option<Vec<u8>>, MemoryError> {
        Ok(self
            .inbox
            .lock()
            .map_err(|_| MemoryError::Poisoned)?
            .pop_front())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn remote_addr(&self) -> Option<Address> {
        Some(Address::Custom(self.peer.clone()))
    }

    fn close(&self) -> Result<(), MemoryError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from() {
        let socket: Address = "127.0.0.1:8080".parse::<SocketAddr>().unwrap().into();
        assert!(matches!(socket, Address::Socket(_)));

        let custom: Address = "ws://localhost:8080".into();
        assert!(matches!(custom, Address::Custom(_)));
    }

    #[test]
    fn test_memory_pair() {
        let (server, client) = MemoryConnection::pair("server", "client");
        server.send_reliable(b"one").unwrap();
        server.send_unreliable(b"two").unwrap();

        assert_eq!(client.pending(), 2);
        assert!(client.drop_next());
        assert_eq!(client.recv().unwrap(), Some(b"two".to_vec()));
        assert_eq!(client.recv().unwrap(), None);
        assert_eq!(client.remote_addr(), Some(Address::Custom("server".to_string())));

        client.close().unwrap();
        assert!(!server.is_connected());
        assert!(matches!(server.send_reliable(b"x"), Err(MemoryError::Closed)));
    }
}
