//! Discrete session outcomes surfaced to the game layer.
//!
//! Transport and protocol failures never propagate upward as errors; the
//! game layer only ever observes these events plus the message inbox.

#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    PlayerJoined { slot: u8, name: String },
    /// Graceful leave, announced by the player itself.
    PlayerLeft { slot: u8 },
    /// Liveness or transport failure decided by the host.
    PlayerDropped { slot: u8 },
    /// Administrative removal; the address is banned as a side effect.
    PlayerKicked { slot: u8 },
    /// The connection to the host is gone; the session is over.
    HostDropped,
    FileProgress { name: String, percent: f32 },
    FileComplete { name: String },
}
