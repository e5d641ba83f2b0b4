//! Reassembly of discrete messages from a TCP byte stream.
//!
//! Each connection owns one [`MessageFramer`]: a fixed-capacity accumulation
//! buffer, a read cursor and a byte count. Newly read bytes are appended at
//! the tail; once the header and the body length it declares are both
//! present, exactly that many bytes are copied out as one message and the
//! unread remainder is compacted back to the start of the buffer. The
//! compaction is what keeps the buffer bounded across long streams of small
//! messages.
//!
//! Framing is deliberately decoupled from delivery, so a host can interleave
//! per-connection reads within one poll cycle without blocking on a single
//! slow peer.

use crate::error::NetError;
use crate::message::NetMessage;
use crate::transport::{Connection, ReadOutcome};
use crate::{MAX_WIRE_BODY, MSG_HEADER_SIZE, NET_BUFFER_SIZE};

#[derive(Debug)]
pub struct MessageFramer {
    buffer: Box<[u8]>,
    /// Offset of the first unread byte.
    start: usize,
    /// Number of unread bytes from `start`.
    bytes: usize,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFramer {
    pub fn new() -> Self {
        MessageFramer {
            buffer: vec![0u8; NET_BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            bytes: 0,
        }
    }

    /// Number of buffered, not yet extracted bytes.
    pub fn buffered(&self) -> usize {
        self.bytes
    }

    /// Appends raw stream bytes at the tail, compacting first when the tail
    /// lacks room. Overflowing the fixed capacity without a complete message
    /// is a fatal protocol error.
    pub fn push(&mut self, data: &[u8]) -> Result<(), NetError> {
        if self.bytes + data.len() > self.buffer.len() {
            return Err(NetError::BufferOverflow);
        }
        if self.start + self.bytes + data.len() > self.buffer.len() {
            self.compact();
        }
        let tail = self.start + self.bytes;
        self.buffer[tail..tail + data.len()].copy_from_slice(data);
        self.bytes += data.len();
        Ok(())
    }

    /// Extracts the next complete message, if the buffer holds one.
    pub fn try_extract(&mut self) -> Result<Option<NetMessage>, NetError> {
        if self.bytes < MSG_HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; MSG_HEADER_SIZE];
        header.copy_from_slice(&self.buffer[self.start..self.start + MSG_HEADER_SIZE]);
        let body_len = u16::from_be_bytes([header[0], header[1]]) as usize;

        if body_len > MAX_WIRE_BODY {
            return Err(NetError::Oversized(body_len));
        }
        if self.bytes < MSG_HEADER_SIZE + body_len {
            return Ok(None);
        }

        let body_start = self.start + MSG_HEADER_SIZE;
        let msg = NetMessage {
            msg_type: header[2],
            padding: header[3],
            destination: header[4],
            source: header[5],
            body: self.buffer[body_start..body_start + body_len].to_vec(),
        };

        self.start += MSG_HEADER_SIZE + body_len;
        self.bytes -= MSG_HEADER_SIZE + body_len;
        if self.start != 0 {
            self.compact();
        }

        Ok(Some(msg))
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buffer.copy_within(self.start..self.start + self.bytes, 0);
        self.start = 0;
    }
}

/// A connection paired with its framer. This is the unit the host keeps per
/// player slot (and per join candidate) and the client keeps for the host.
#[derive(Debug)]
pub struct NetLink {
    conn: Connection,
    framer: MessageFramer,
}

impl NetLink {
    pub fn new(conn: Connection) -> Self {
        NetLink {
            conn,
            framer: MessageFramer::new(),
        }
    }

    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.conn.peer_addr()
    }

    /// The underlying connection, for readiness polling over a set of links.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_valid(&self) -> bool {
        self.conn.is_valid()
    }

    pub fn invalidate(&mut self) {
        self.conn.invalidate();
    }

    /// Sends one message, refusing bodies beyond the wire bound.
    pub async fn send(&mut self, msg: &NetMessage) -> Result<(), NetError> {
        if msg.body.len() > MAX_WIRE_BODY {
            return Err(NetError::Oversized(msg.body.len()));
        }
        self.conn.write_all(&msg.to_wire()).await
    }

    /// Relays pre-framed bytes verbatim, without decoding the body.
    pub async fn send_raw(&mut self, wire: &[u8]) -> Result<(), NetError> {
        self.conn.write_all(wire).await
    }

    /// Drains everything currently readable into the framer and returns the
    /// complete messages found. A framing error invalidates the connection;
    /// a peer close leaves already-framed messages deliverable, with
    /// [`NetLink::is_valid`] turning false for the caller to observe.
    pub fn pump(&mut self) -> Result<Vec<NetMessage>, NetError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 2048];

        loop {
            match self.framer.try_extract() {
                Ok(Some(msg)) => {
                    out.push(msg);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    self.conn.invalidate();
                    return Err(e);
                }
            }

            match self.conn.try_read(&mut buf) {
                ReadOutcome::Data(n) => {
                    if let Err(e) = self.framer.push(&buf[..n]) {
                        self.conn.invalidate();
                        return Err(e);
                    }
                }
                ReadOutcome::WouldBlock | ReadOutcome::Closed => break,
            }
        }

        Ok(out)
    }
}
