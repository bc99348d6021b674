//! Idle tunnel connections waiting for a public request
//!
//! Connections enter through [`RelayPool::accept`] once authenticated, leave
//! through [`RelayPool::checkout`] for exactly one request/response cycle and
//! come back through [`RelayPool::release`]. A connection that failed is simply
//! dropped by its holder, which closes the socket.

use reverse_relay_common::{Result, TunnelError, constants::POOL_CAPACITY};
use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{net::TcpStream, sync::Mutex};
use tracing::{debug, warn};

/// An authenticated agent connection
#[derive(Debug)]
pub struct TunnelConnection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
}

impl TunnelConnection {
    pub fn new(id: u64, peer: SocketAddr, stream: TcpStream) -> Self {
        Self { id, peer, stream }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

/// Bounded FIFO of idle tunnel connections
#[derive(Debug)]
pub struct RelayPool {
    idle: Mutex<VecDeque<TunnelConnection>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new(POOL_CAPACITY)
    }
}

impl RelayPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a newly admitted connection
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a freshly authenticated connection
    ///
    /// When the pool is full the connection is dropped (closed) and
    /// `CapacityExhausted` is returned.
    pub async fn accept(&self, conn: TunnelConnection) -> Result<()> {
        let mut idle = self.idle.lock().await;
        if idle.len() >= self.capacity {
            warn!(
                "Pool full ({}), closing connection {} from {}",
                self.capacity, conn.id, conn.peer
            );
            return Err(TunnelError::CapacityExhausted);
        }
        idle.push_back(conn);
        Ok(())
    }

    /// Take the oldest idle connection without waiting
    pub async fn checkout(&self) -> Option<TunnelConnection> {
        let conn = self.idle.lock().await.pop_front();
        if let Some(conn) = &conn {
            debug!("Checked out connection {}", conn.id);
        }
        conn
    }

    /// Put a healthy connection back at the tail
    pub async fn release(&self, conn: TunnelConnection) {
        let mut idle = self.idle.lock().await;
        if idle.len() >= self.capacity {
            warn!("Pool full, dropping released connection {}", conn.id);
            return;
        }
        debug!("Released connection {}", conn.id);
        idle.push_back(conn);
    }

    pub async fn len(&self) -> usize {
        self.idle.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.idle.lock().await.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Connected socket pair; the first half is what the relay would hold
    pub(crate) async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (server.unwrap().0, client.unwrap())
    }

    async fn connection(pool: &RelayPool) -> (TunnelConnection, TcpStream) {
        let (relay_side, agent_side) = socket_pair().await;
        let peer = agent_side.local_addr().unwrap();
        (TunnelConnection::new(pool.next_id(), peer, relay_side), agent_side)
    }

    #[tokio::test]
    async fn test_checkout_empty_returns_none() {
        let pool = RelayPool::default();
        assert!(pool.is_empty().await);
        assert!(pool.checkout().await.is_none());
        assert_eq!(pool.capacity(), POOL_CAPACITY);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let pool = RelayPool::new(8);
        let (first, _a) = connection(&pool).await;
        let (second, _b) = connection(&pool).await;
        let (first_id, second_id) = (first.id(), second.id());
        assert_ne!(first_id, second_id);

        pool.accept(first).await.unwrap();
        pool.accept(second).await.unwrap();
        assert_eq!(pool.len().await, 2);

        let conn = pool.checkout().await.unwrap();
        assert_eq!(conn.id(), first_id);

        // Released connections go to the back of the queue
        pool.release(conn).await;
        assert_eq!(pool.checkout().await.unwrap().id(), second_id);
        assert_eq!(pool.checkout().await.unwrap().id(), first_id);
        assert!(pool.checkout().await.is_none());
    }

    #[tokio::test]
    async fn test_accept_rejects_when_full() {
        let pool = RelayPool::new(1);
        let (first, _a) = connection(&pool).await;
        let (second, _b) = connection(&pool).await;

        pool.accept(first).await.unwrap();
        assert!(matches!(
            pool.accept(second).await,
            Err(TunnelError::CapacityExhausted)
        ));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_connection_closes_socket() {
        use tokio::io::AsyncReadExt;

        let pool = RelayPool::new(1);
        let (conn, mut agent_side) = connection(&pool).await;
        pool.accept(conn).await.unwrap();

        let conn = pool.checkout().await.unwrap();
        drop(conn);

        let mut buf = [0u8; 1];
        assert_eq!(agent_side.read(&mut buf).await.unwrap(), 0);
        assert!(pool.is_empty().await);
    }
}
