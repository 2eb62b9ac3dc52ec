//! In-process connection pair backed by Tokio channels.
//!
//! Used by tests and tools that want to drive a session without a socket.
//! The [`MemoryConnection`] half implements [`Connection`]; the
//! [`MemoryPeer`] half plays the remote client.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};

use crate::{Connection, ConnectionId, Frame, TransportError};

/// Creates a connected `(server side, client side)` pair.
pub fn memory_pair() -> (MemoryConnection, MemoryPeer) {
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (closed, closed_rx) = watch::channel(false);
    let conn = MemoryConnection {
        id: ConnectionId::next(),
        outbound: to_peer,
        inbound: Mutex::new(from_peer),
        closed,
        fail_sends: AtomicBool::new(false),
        stall_sends: AtomicBool::new(false),
    };
    let peer = MemoryPeer {
        outbound: Some(to_server),
        inbound: from_server,
        closed: closed_rx,
    };
    (conn, peer)
}

pub struct MemoryConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
    closed: watch::Sender<bool>,
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
}

impl MemoryConnection {
    /// Makes every subsequent `send` fail as if the socket broke.
    pub fn break_sends(&self) {
        self.fail_sends.store(true, Ordering::Release);
    }

    /// Makes every subsequent `send` park until the connection is closed,
    /// like a peer that stopped reading its socket.
    pub fn stall_sends(&self) {
        self.stall_sends.store(true, Ordering::Release);
    }
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(TransportError::send_failed("broken pipe"));
        }
        if self.stall_sends.load(Ordering::Acquire) {
            let mut closed = self.closed.subscribe();
            let _ = closed.wait_for(|c| *c).await;
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => Ok(frame),
            _ = closed.wait_for(|c| *c) => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Client side of a [`memory_pair`].
pub struct MemoryPeer {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    closed: watch::Receiver<bool>,
}

impl MemoryPeer {
    /// Sends a frame to the server side. Returns `false` once disconnected.
    pub fn send(&self, frame: impl Into<Frame>) -> bool {
        self.outbound
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Next frame the server sent, or `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.inbound.try_recv().ok()
    }

    /// Simulates the client hanging up: the server's `recv` returns `None`.
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }

    /// Whether the server side closed the connection.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
