//! Error taxonomy for the transport and protocol layers.
//!
//! Transport and protocol failures are handled at the connection boundary
//! and terminate at most that one connection; only discrete outcomes
//! (joined, left, dropped, rejected) ever reach the game layer.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("handshake timed out waiting for the host")]
    HandshakeTimeout,

    /// A zero-byte read is treated identically to a socket error.
    #[error("connection closed by peer")]
    Closed,

    /// The accumulation buffer filled up without containing one complete
    /// message. Fatal for the connection, never recoverable.
    #[error("accumulation buffer overflow before a complete message")]
    BufferOverflow,

    #[error("declared body length {0} exceeds the message bound")]
    Oversized(usize),

    #[error("decode type mismatch: expected message type {expected}, found {found}")]
    TypeMismatch { expected: u8, found: u8 },

    #[error("message body truncated while reading a field")]
    Truncated,

    #[error("malformed data: {0}")]
    Malformed(&'static str),

    #[error("cipher requires block-aligned input")]
    CipherBlock,

    #[error("lobby server unavailable")]
    LobbyUnavailable,

    #[error("join rejected: {0}")]
    JoinRefused(RejectReason),
}

/// Reason codes sent with a join rejection. The `u8` values are the wire
/// representation and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    WrongVersion = 1,
    WrongPassword = 2,
    Full = 3,
    /// Declared mod list differs from the host's.
    WrongData = 4,
    Banned = 5,
}

impl RejectReason {
    pub fn from_u8(value: u8) -> Result<Self, NetError> {
        match value {
            1 => Ok(RejectReason::WrongVersion),
            2 => Ok(RejectReason::WrongPassword),
            3 => Ok(RejectReason::Full),
            4 => Ok(RejectReason::WrongData),
            5 => Ok(RejectReason::Banned),
            _ => Err(NetError::Malformed("unknown rejection reason code")),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            RejectReason::WrongVersion => "protocol version mismatch",
            RejectReason::WrongPassword => "wrong password",
            RejectReason::Full => "session is full",
            RejectReason::WrongData => "incompatible mod list",
            RejectReason::Banned => "address is banned",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
