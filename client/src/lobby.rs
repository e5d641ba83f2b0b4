//! Discovery against the lobby (directory) server.
//!
//! Short-lived request/response exchanges, separate from any host
//! connection: `list` returns a count followed by that many fixed-layout
//! advertisement records; `join` fetches a single record straight from a
//! host. A malformed or undersized response is a protocol error and the
//! directory connection is abandoned; callers degrade to an empty listing
//! and local play continues.

use log::{debug, warn};

use shared::gamestruct::{ADVERT_WIRE_SIZE, CMD_JOIN, CMD_LIST};
use shared::{Connection, GameAdvert, NetError, CONNECT_TIMEOUT_MS, LOBBY_RESPONSE_TIMEOUT_MS};

/// Sanity bound on the advertised game count; anything above it is treated
/// as a malformed response rather than a download of the whole internet.
const MAX_LISTED_GAMES: u32 = 100;

/// Queries the directory server for every advertised session.
pub async fn list_games(lobby_addr: &str) -> Result<Vec<GameAdvert>, NetError> {
    let mut conn = Connection::connect(lobby_addr, CONNECT_TIMEOUT_MS).await?;
    conn.write_all(CMD_LIST).await?;

    let mut count_buf = [0u8; 4];
    conn.read_exact(&mut count_buf, LOBBY_RESPONSE_TIMEOUT_MS)
        .await
        .map_err(|_| NetError::Malformed("undersized lobby response"))?;
    let count = u32::from_be_bytes(count_buf);
    if count > MAX_LISTED_GAMES {
        warn!("lobby advertised {} games; abandoning the response", count);
        return Err(NetError::Malformed("implausible game count from lobby"));
    }

    let mut games = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut record = [0u8; ADVERT_WIRE_SIZE];
        conn.read_exact(&mut record, LOBBY_RESPONSE_TIMEOUT_MS)
            .await
            .map_err(|_| NetError::Malformed("undersized game record from lobby"))?;
        games.push(GameAdvert::read_wire(&record)?);
    }

    debug!("lobby listed {} game(s)", games.len());
    Ok(games)
}

/// Fetches the advertisement record of one host directly. When the record
/// leaves its own address empty, it is filled in from the address we
/// actually connected to.
pub async fn lookup_game(host_addr: &str) -> Result<GameAdvert, NetError> {
    let mut conn = Connection::connect(host_addr, CONNECT_TIMEOUT_MS).await?;
    conn.write_all(CMD_JOIN).await?;

    let mut record = [0u8; ADVERT_WIRE_SIZE];
    conn.read_exact(&mut record, LOBBY_RESPONSE_TIMEOUT_MS)
        .await
        .map_err(|_| NetError::Malformed("undersized game record from host"))?;
    let mut advert = GameAdvert::read_wire(&record)?;

    if advert.host.is_empty() {
        advert.host = conn.peer_addr().ip().to_string();
    }
    Ok(advert)
}
