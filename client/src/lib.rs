//! # Session Client Library
//!
//! The joining side of the multiplayer session layer. A client holds exactly
//! one connection, to the host, and everything it knows about the session
//! arrives over it: the accept/reject verdict on its join request, the
//! roster of player seats, lifecycle notifications, game flags and map-file
//! chunks.
//!
//! ## Module Organization
//!
//! - [`network`]: the session itself, covering connect, the join handshake,
//!   the per-tick pump that mirrors the roster and surfaces events, sending
//!   and the graceful leave.
//! - [`lobby`]: discovery against the directory server (`list`) and the
//!   direct single-record query against a host (`join`).
//! - [`filerecv`]: reassembly of chunked file transfers, including the
//!   "already have this file" short-circuit.
//!
//! The game layer above only calls `send`/`recv` and drains [`shared::NetEvent`]
//! values; it never touches sockets.

pub mod filerecv;
pub mod lobby;
pub mod network;

pub use filerecv::{FileProgress, FileReceiver};
pub use network::{ClientSession, JoinSettings};
