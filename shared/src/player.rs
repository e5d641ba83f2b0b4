//! Per-slot player state shared by host and clients.
//!
//! The host owns the authoritative copy; clients mirror it from player-info
//! broadcasts. The field write/read pair below defines the body layout of
//! that broadcast.

use crate::codec::{MessageReader, MessageWriter};
use crate::error::NetError;
use crate::message::{MsgType, NetMessage};
use crate::MAX_NAME_LEN;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerInfo {
    pub allocated: bool,
    pub name: String,
    /// Liveness flag, refreshed by any traffic from the slot's connection.
    pub heartbeat: bool,
    /// Set when the slot is marked for removal.
    pub kick: bool,
    /// Millisecond session timestamp of the first missed heartbeat, zero
    /// while healthy.
    pub heart_attack_at: u64,
    pub colour: u8,
    pub position: u8,
    pub team: u8,
    pub ready: bool,
}

impl PlayerInfo {
    pub fn write_fields(&self, w: &mut MessageWriter) {
        w.bool(self.allocated);
        w.string(&self.name, MAX_NAME_LEN);
        w.bool(self.heartbeat);
        w.bool(self.kick);
        w.u64(self.heart_attack_at);
        w.u8(self.colour);
        w.u8(self.position);
        w.u8(self.team);
        w.bool(self.ready);
    }

    pub fn read_fields(r: &mut MessageReader<'_>) -> Result<Self, NetError> {
        Ok(PlayerInfo {
            allocated: r.bool()?,
            name: r.string(MAX_NAME_LEN)?,
            heartbeat: r.bool()?,
            kick: r.bool()?,
            heart_attack_at: r.u64()?,
            colour: r.u8()?,
            position: r.u8()?,
            team: r.u8()?,
            ready: r.bool()?,
        })
    }
}

/// Builds the player-info message for one seat: slot index, the seat's
/// fields, then the current host-slot index.
pub fn build_player_info(
    slot: u8,
    info: &PlayerInfo,
    host_slot: u8,
    destination: u8,
) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::PlayerInfo, destination);
    w.u8(slot);
    info.write_fields(&mut w);
    w.u8(host_slot);
    w.end()
}

/// Inverse of [`build_player_info`]: `(slot, fields, host_slot)`.
pub fn parse_player_info(msg: &NetMessage) -> Result<(u8, PlayerInfo, u8), NetError> {
    let mut r = MessageReader::begin(msg, MsgType::PlayerInfo)?;
    let slot = r.u8()?;
    let info = PlayerInfo::read_fields(&mut r)?;
    let host_slot = r.u8()?;
    r.end()?;
    Ok((slot, info, host_slot))
}
