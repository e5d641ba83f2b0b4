//! # Session Wire Protocol Library
//!
//! Shared protocol layer for the multiplayer session system. Everything that
//! both the hosting side and the joining side must agree on lives here:
//!
//! - the length-prefixed message envelope and its header layout
//! - the order-and-width-declared field codec (the field order *is* the wire
//!   format; there is no tag/length/value self-description)
//! - the buffered framer that reassembles discrete messages from a TCP byte
//!   stream, including partial reads and tail compaction
//! - the non-blocking socket transport primitives
//! - the TEA block cipher used to obscure selected packet types
//! - the fixed-layout game advertisement record exchanged with the lobby
//!   (directory) server
//!
//! The host and client crates build their session logic on top of these
//! primitives; the game-simulation layer above them only ever sees
//! [`NetMessage`] values and [`NetEvent`] outcomes, never sockets.

pub mod cipher;
pub mod codec;
pub mod error;
pub mod event;
pub mod framer;
pub mod gamestruct;
pub mod message;
pub mod player;
pub mod stats;
pub mod transport;

pub use cipher::NetCipher;
pub use codec::{MessageReader, MessageWriter};
pub use error::{NetError, RejectReason};
pub use event::NetEvent;
pub use framer::{MessageFramer, NetLink};
pub use gamestruct::GameAdvert;
pub use message::{MsgType, NetMessage, ENCRYPTED_FLAG};
pub use player::PlayerInfo;
pub use stats::NetStats;
pub use transport::{Connection, Listener, ReadOutcome};

/// Size of the player-slot array. Slot indices are `0..MAX_CONNECTED_PLAYERS`.
pub const MAX_CONNECTED_PLAYERS: usize = 8;

/// Bound on candidate connections that have been accepted but not yet joined.
pub const MAX_TMP_SOCKETS: usize = 16;

/// Capacity of the per-connection accumulation buffer. Exceeding it without
/// a complete message in sight is a fatal protocol error for that connection.
pub const NET_BUFFER_SIZE: usize = 16 * 1024;

/// Maximum plaintext body length of a single message.
pub const MAX_MSG_BODY: usize = 4096;

/// Maximum body length on the wire: a full body plus cipher padding.
pub const MAX_WIRE_BODY: usize = MAX_MSG_BODY + cipher::CIPHER_BLOCK - 1;

/// Wire header: size (u16, network order) + type + padding + destination + source.
pub const MSG_HEADER_SIZE: usize = 6;

/// Destination sentinel meaning "every allocated player slot".
pub const NET_ALL_PLAYERS: u8 = 0xFF;

/// Slot index the hosting player always occupies.
pub const NET_HOST_SLOT: u8 = 0;

/// Protocol version pair. Joins with a different pair are always rejected.
pub const NETCODE_VERSION_MAJOR: u32 = 4;
pub const NETCODE_VERSION_MINOR: u32 = 1;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_MODLIST_LEN: usize = 255;
pub const MAX_FILENAME_LEN: usize = 255;

/// Upper bound on the payload carried by one file-transfer message.
pub const FILE_CHUNK_SIZE: usize = 2048;

/// Bounded timeout for outgoing connection attempts.
pub const CONNECT_TIMEOUT_MS: u64 = 1500;

/// Bounded timeout for lobby request/response exchanges.
pub const LOBBY_RESPONSE_TIMEOUT_MS: u64 = 10_000;
