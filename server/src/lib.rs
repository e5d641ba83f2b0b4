//! # Session Host Library
//!
//! The host-authoritative side of the multiplayer session layer. The host
//! owns the player-slot registry, accepts and validates join requests,
//! relays traffic between players, watches liveness, and advertises the
//! session to the lobby (directory) server.
//!
//! ## Core Responsibilities
//!
//! ### Join Handshake
//! New connections land in a bounded temporary pool, separate from the
//! player-slot array, until they present a valid join request. Validation
//! checks (ban list, protocol version, password, mod list, capacity) run
//! in a fixed order, and a rejected connection never consumes a slot.
//!
//! ### Relay & Routing
//! The host is the hub of a star topology. Broadcast messages are consumed
//! by the host's system dispatcher and fanned out to every other allocated
//! slot; messages addressed to a specific foreign slot are relayed
//! byte-for-byte without decoding the body, so unknown game-layer message
//! types pass through unharmed.
//!
//! ### Lifecycle & Liveness
//! Graceful leaves, liveness drops and administrative kicks all converge on
//! one slot-deallocation primitive but broadcast distinct notifications.
//! Notifications are queued and written only after the current receive pass,
//! never from inside connection iteration.
//!
//! ## Module Organization
//!
//! - [`registry`]: the bounded slot arena; allocation and deallocation are
//!   its only mutations.
//! - [`host`]: the session itself, covering the accept loop, join
//!   validation, routing, heartbeat checks and the game-layer send/recv
//!   boundary.
//! - [`banlist`]: address/identity permission table consulted before any
//!   protocol bytes are processed.
//! - [`lobby`]: registration with the directory server, degrading to
//!   unlisted hosting when it is unreachable.
//! - [`filesend`]: chunked map-file distribution to joining clients.

pub mod banlist;
pub mod filesend;
pub mod host;
pub mod lobby;
pub mod registry;

pub use banlist::{Decision, PermissionTable};
pub use filesend::FileSender;
pub use host::{HostConfig, HostSession};
pub use registry::PlayerRegistry;
