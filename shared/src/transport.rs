//! Non-blocking TCP transport primitives.
//!
//! Reads never block: [`Connection::try_read`] reports would-block instead,
//! and a zero-byte read is treated identically to a socket error: the peer
//! is gone and the connection is marked invalid. Writes go through
//! [`Connection::write_all`], which loops internally over partial writes and
//! never silently drops bytes. All waits are bounded.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};

use crate::error::NetError;

/// Result of a non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    WouldBlock,
    /// Peer closed or socket error; the connection is now invalid.
    Closed,
}

/// One TCP connection. Invalid connections stay around until their owner
/// notices and tears the surrounding state down; every operation on them
/// reports closure instead of touching the socket.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    valid: bool,
}

impl Connection {
    /// Establishes a connection within `timeout_ms` milliseconds.
    pub async fn connect(addr: &str, timeout_ms: u64) -> Result<Self, NetError> {
        let attempt = timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr)).await;
        let stream = match attempt {
            Err(_) => return Err(NetError::ConnectTimeout),
            Ok(result) => result?,
        };
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, NetError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Connection {
            stream,
            peer,
            valid: true,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if !self.valid {
            return ReadOutcome::Closed;
        }
        match self.stream.try_read(buf) {
            Ok(0) => {
                self.valid = false;
                ReadOutcome::Closed
            }
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
            Err(_) => {
                self.valid = false;
                ReadOutcome::Closed
            }
        }
    }

    /// Writes the whole buffer, coping with partial writes internally.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), NetError> {
        if !self.valid {
            return Err(NetError::Closed);
        }
        match self.stream.write_all(data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.valid = false;
                Err(NetError::Io(e))
            }
        }
    }

    /// Reads exactly `buf.len()` bytes within `timeout_ms` milliseconds.
    /// Used by the short-lived lobby exchanges, where the response layout is
    /// fixed and anything less is a protocol error.
    pub async fn read_exact(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<(), NetError> {
        if !self.valid {
            return Err(NetError::Closed);
        }
        let attempt = timeout(Duration::from_millis(timeout_ms), self.stream.read_exact(buf)).await;
        match attempt {
            Err(_) => {
                self.valid = false;
                Err(NetError::Closed)
            }
            Ok(Err(e)) => {
                self.valid = false;
                Err(NetError::Io(e))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }
}

/// Accepting side of the transport.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(port: u16) -> Result<Self, NetError> {
        let inner = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Listener { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.inner.local_addr()?)
    }

    /// Non-blocking accept: returns immediately when no connection is
    /// pending.
    pub async fn try_accept(&self) -> Option<(Connection, SocketAddr)> {
        match timeout(Duration::from_millis(0), self.inner.accept()).await {
            Ok(Ok((stream, addr))) => Connection::from_stream(stream).ok().map(|c| (c, addr)),
            _ => None,
        }
    }
}

/// Readiness poll over a bounded set of connections. Returns the indices of
/// connections with readable data, waiting at most `timeout_ms`. Invalid
/// connections are never reported ready.
pub async fn poll_readable(conns: &[&Connection], timeout_ms: u64) -> Vec<usize> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let mut ready = Vec::new();
        for (i, conn) in conns.iter().enumerate() {
            if !conn.is_valid() {
                continue;
            }
            let probe = timeout(Duration::from_millis(0), conn.stream.ready(Interest::READABLE)).await;
            if matches!(probe, Ok(Ok(_))) {
                ready.push(i);
            }
        }
        if !ready.is_empty() || Instant::now() >= deadline {
            return ready;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
