//! The fixed-layout game advertisement record and the lobby command words.
//!
//! The record is what a host publishes to the directory server and what
//! clients receive back from a `list` query. It is serialized field by field
//! in a fixed order with fixed widths (integers in network byte order,
//! strings zero-padded to their field width) and never as a raw struct
//! memory dump, so the layout is identical regardless of host platform.

use crate::error::NetError;

/// Width of the session name field.
pub const ADVERT_NAME_WIDTH: usize = 64;
/// Width of each host address field.
pub const ADVERT_HOST_WIDTH: usize = 40;
/// Width of the mod list field.
pub const ADVERT_MODS_WIDTH: usize = 255;

/// Total size of one record on the wire.
pub const ADVERT_WIRE_SIZE: usize = 4            // advert_version
    + ADVERT_NAME_WIDTH                          // name
    + ADVERT_HOST_WIDTH * 3                      // host + two secondary hosts
    + 4 * 2                                      // protocol version pair
    + 4 * 2                                      // max / current players
    + 4 * 4                                      // user flags
    + 4                                          // password flag
    + 4                                          // game id
    + ADVERT_MODS_WIDTH;                         // mod list

/// Version number of the record layout itself.
pub const ADVERT_VERSION: u32 = 3;

/// Lobby protocol command words: four ASCII characters plus a terminator.
pub const LOBBY_COMMAND_LEN: usize = 5;
pub const CMD_LIST: &[u8; LOBBY_COMMAND_LEN] = b"list\0";
pub const CMD_JOIN: &[u8; LOBBY_COMMAND_LEN] = b"join\0";
pub const CMD_ADD_GAME: &[u8; LOBBY_COMMAND_LEN] = b"addg\0";
pub const CMD_GAME_ID: &[u8; LOBBY_COMMAND_LEN] = b"gaId\0";

/// One hosted session as seen by the directory server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameAdvert {
    pub advert_version: u32,
    pub name: String,
    /// Primary host address; filled in by the lobby from the connection's
    /// source address when the host leaves it empty.
    pub host: String,
    pub secondary_hosts: [String; 2],
    pub version_major: u32,
    pub version_minor: u32,
    pub max_players: u32,
    pub current_players: u32,
    /// Four opaque flags owned by the game layer.
    pub user_flags: [i32; 4],
    pub password_required: bool,
    /// Identifier assigned by the lobby (or generated locally when hosting
    /// unlisted).
    pub game_id: u32,
    pub mods: String,
}

impl GameAdvert {
    pub fn write_wire(&self) -> [u8; ADVERT_WIRE_SIZE] {
        let mut buf = [0u8; ADVERT_WIRE_SIZE];
        let mut off = 0;

        put_u32(&mut buf, &mut off, self.advert_version);
        put_str(&mut buf, &mut off, &self.name, ADVERT_NAME_WIDTH);
        put_str(&mut buf, &mut off, &self.host, ADVERT_HOST_WIDTH);
        put_str(&mut buf, &mut off, &self.secondary_hosts[0], ADVERT_HOST_WIDTH);
        put_str(&mut buf, &mut off, &self.secondary_hosts[1], ADVERT_HOST_WIDTH);
        put_u32(&mut buf, &mut off, self.version_major);
        put_u32(&mut buf, &mut off, self.version_minor);
        put_u32(&mut buf, &mut off, self.max_players);
        put_u32(&mut buf, &mut off, self.current_players);
        for flag in self.user_flags {
            put_u32(&mut buf, &mut off, flag as u32);
        }
        put_u32(&mut buf, &mut off, self.password_required as u32);
        put_u32(&mut buf, &mut off, self.game_id);
        put_str(&mut buf, &mut off, &self.mods, ADVERT_MODS_WIDTH);

        debug_assert_eq!(off, ADVERT_WIRE_SIZE);
        buf
    }

    pub fn read_wire(data: &[u8]) -> Result<Self, NetError> {
        if data.len() < ADVERT_WIRE_SIZE {
            return Err(NetError::Malformed("undersized game advertisement record"));
        }
        let mut off = 0;

        let advert_version = get_u32(data, &mut off);
        let name = get_str(data, &mut off, ADVERT_NAME_WIDTH)?;
        let host = get_str(data, &mut off, ADVERT_HOST_WIDTH)?;
        let secondary_hosts = [
            get_str(data, &mut off, ADVERT_HOST_WIDTH)?,
            get_str(data, &mut off, ADVERT_HOST_WIDTH)?,
        ];
        let version_major = get_u32(data, &mut off);
        let version_minor = get_u32(data, &mut off);
        let max_players = get_u32(data, &mut off);
        let current_players = get_u32(data, &mut off);
        let mut user_flags = [0i32; 4];
        for flag in &mut user_flags {
            *flag = get_u32(data, &mut off) as i32;
        }
        let password_required = get_u32(data, &mut off) != 0;
        let game_id = get_u32(data, &mut off);
        let mods = get_str(data, &mut off, ADVERT_MODS_WIDTH)?;

        Ok(GameAdvert {
            advert_version,
            name,
            host,
            secondary_hosts,
            version_major,
            version_minor,
            max_players,
            current_players,
            user_flags,
            password_required,
            game_id,
            mods,
        })
    }
}

fn put_u32(buf: &mut [u8], off: &mut usize, value: u32) {
    buf[*off..*off + 4].copy_from_slice(&value.to_be_bytes());
    *off += 4;
}

fn put_str(buf: &mut [u8], off: &mut usize, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    buf[*off..*off + n].copy_from_slice(&bytes[..n]);
    *off += width;
}

fn get_u32(buf: &[u8], off: &mut usize) -> u32 {
    let v = u32::from_be_bytes([buf[*off], buf[*off + 1], buf[*off + 2], buf[*off + 3]]);
    *off += 4;
    v
}

fn get_str(buf: &[u8], off: &mut usize, width: usize) -> Result<String, NetError> {
    let field = &buf[*off..*off + width];
    *off += width;
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| NetError::Malformed("advertisement string is not valid utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_advert() -> GameAdvert {
        GameAdvert {
            advert_version: ADVERT_VERSION,
            name: "2v2 no rush".to_string(),
            host: "203.0.113.7".to_string(),
            secondary_hosts: ["10.0.0.7".to_string(), String::new()],
            version_major: 4,
            version_minor: 1,
            max_players: 8,
            current_players: 3,
            user_flags: [1, -2, 0, i32::MAX],
            password_required: true,
            game_id: 0xCAFE_BABE,
            mods: "balance-patch; extra-maps".to_string(),
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let advert = sample_advert();
        let wire = advert.write_wire();
        assert_eq!(GameAdvert::read_wire(&wire).unwrap(), advert);
    }

    #[test]
    fn test_wire_size_is_fixed() {
        let empty = GameAdvert::default();
        let full = sample_advert();
        assert_eq!(empty.write_wire().len(), ADVERT_WIRE_SIZE);
        assert_eq!(full.write_wire().len(), ADVERT_WIRE_SIZE);
    }

    #[test]
    fn test_integers_in_network_byte_order() {
        let mut advert = GameAdvert::default();
        advert.advert_version = 0x0102_0304;
        let wire = advert.write_wire();
        assert_eq!(&wire[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_undersized_record_rejected() {
        let advert = sample_advert();
        let wire = advert.write_wire();
        assert!(GameAdvert::read_wire(&wire[..ADVERT_WIRE_SIZE - 1]).is_err());
        assert!(GameAdvert::read_wire(&[]).is_err());
    }

    #[test]
    fn test_overlong_strings_truncate() {
        let mut advert = sample_advert();
        advert.name = "n".repeat(ADVERT_NAME_WIDTH + 50);
        let wire = advert.write_wire();
        let back = GameAdvert::read_wire(&wire).unwrap();
        assert_eq!(back.name.len(), ADVERT_NAME_WIDTH);
    }

    #[test]
    fn test_command_words() {
        for cmd in [CMD_LIST, CMD_JOIN, CMD_ADD_GAME, CMD_GAME_ID] {
            assert_eq!(cmd.len(), LOBBY_COMMAND_LEN);
            assert_eq!(cmd[4], 0);
        }
    }
}
