//! The message envelope and its wire header.
//!
//! Every message travels as a 6-byte header followed by the body:
//! body size (u16, network byte order), type, cipher pad count, destination
//! slot, source slot. The pad count is only nonzero for encrypted messages,
//! whose type byte additionally carries [`ENCRYPTED_FLAG`].

use crate::{MSG_HEADER_SIZE, NET_ALL_PLAYERS};

/// Flag bit OR-ed into the wire type byte of encrypted messages. System and
/// game message types must stay below this value.
pub const ENCRYPTED_FLAG: u8 = 0x80;

/// System message types. The numbering starts at 90, leaving the space below
/// for game-layer traffic which the session layer routes without decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Join = 90,
    Accepted = 91,
    Rejected = 92,
    PlayerInfo = 93,
    PlayerJoined = 94,
    PlayerLeft = 95,
    PlayerDropped = 96,
    Kick = 97,
    GameFlags = 98,
    File = 99,
    Ping = 100,
}

impl MsgType {
    pub fn from_u8(value: u8) -> Option<MsgType> {
        match value {
            90 => Some(MsgType::Join),
            91 => Some(MsgType::Accepted),
            92 => Some(MsgType::Rejected),
            93 => Some(MsgType::PlayerInfo),
            94 => Some(MsgType::PlayerJoined),
            95 => Some(MsgType::PlayerLeft),
            96 => Some(MsgType::PlayerDropped),
            97 => Some(MsgType::Kick),
            98 => Some(MsgType::GameFlags),
            99 => Some(MsgType::File),
            100 => Some(MsgType::Ping),
            _ => None,
        }
    }
}

/// A framed message. `msg_type` holds the raw wire byte, which may carry
/// [`ENCRYPTED_FLAG`]; use [`NetMessage::raw_type`] for comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetMessage {
    pub msg_type: u8,
    /// Number of zero bytes appended to the body before encryption.
    pub padding: u8,
    pub destination: u8,
    pub source: u8,
    pub body: Vec<u8>,
}

impl NetMessage {
    pub fn new(msg_type: MsgType, destination: u8) -> Self {
        Self::new_raw(msg_type as u8, destination)
    }

    /// Envelope with an arbitrary type byte, for game-layer traffic outside
    /// the system range.
    pub fn new_raw(msg_type: u8, destination: u8) -> Self {
        NetMessage {
            msg_type,
            padding: 0,
            destination,
            source: 0,
            body: Vec::new(),
        }
    }

    /// The type byte with the encryption flag stripped.
    pub fn raw_type(&self) -> u8 {
        self.msg_type & !ENCRYPTED_FLAG
    }

    pub fn is_encrypted(&self) -> bool {
        self.msg_type & ENCRYPTED_FLAG != 0
    }

    pub fn is(&self, msg_type: MsgType) -> bool {
        self.raw_type() == msg_type as u8
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == NET_ALL_PLAYERS
    }

    /// Total size of this message on the wire.
    pub fn wire_len(&self) -> usize {
        MSG_HEADER_SIZE + self.body.len()
    }

    /// Serializes the header (size in network byte order) followed by the
    /// body. This is the only way bytes leave the process.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.extend_from_slice(&(self.body.len() as u16).to_be_bytes());
        out.push(self.msg_type);
        out.push(self.padding);
        out.push(self.destination);
        out.push(self.source);
        out.extend_from_slice(&self.body);
        out
    }
}
