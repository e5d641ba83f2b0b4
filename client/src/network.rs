//! The client session: join handshake, roster mirroring, send/receive.
//!
//! A client owns exactly one connection, to the host. The join handshake
//! runs under a deadline: connect, present the join request, then wait for
//! the accept (which carries the assigned slot index) or a rejection code.
//! After that, one `update` per tick pumps the link, applies system
//! messages to the local roster, feeds file chunks to the receiver and
//! queues everything else for the game layer.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use shared::player::parse_player_info;
use shared::{
    MessageReader, MessageWriter, MsgType, NetCipher, NetError, NetEvent, NetLink, NetMessage,
    NetStats, PlayerInfo, RejectReason, CONNECT_TIMEOUT_MS, MAX_CONNECTED_PLAYERS, MAX_MODLIST_LEN,
    MAX_NAME_LEN, MAX_PASSWORD_LEN, NETCODE_VERSION_MAJOR, NETCODE_VERSION_MINOR, NET_ALL_PLAYERS,
    NET_HOST_SLOT,
};

use crate::filerecv::{FileProgress, FileReceiver};

/// How long the whole join handshake may take.
const JOIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct JoinSettings {
    pub name: String,
    pub password: String,
    pub mods: String,
    /// Optional public-identity string presented to the host.
    pub identity: String,
    /// Where received files land.
    pub download_dir: PathBuf,
    /// Idle time after which a keepalive ping goes out so the host keeps
    /// seeing a heartbeat. Must stay well under the host's heartbeat window.
    pub ping_interval: Duration,
}

impl JoinSettings {
    pub fn new(name: &str) -> Self {
        JoinSettings {
            name: name.to_string(),
            password: String::new(),
            mods: String::new(),
            identity: String::new(),
            download_dir: std::env::temp_dir(),
            ping_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub struct ClientSession {
    link: NetLink,
    slot: u8,
    host_slot: u8,
    players: Vec<PlayerInfo>,
    game_flags: [i32; 4],
    cipher: Option<NetCipher>,
    encrypt_all: bool,
    files: FileReceiver,
    inbox: VecDeque<NetMessage>,
    events: VecDeque<NetEvent>,
    stats: NetStats,
    last_sent: Instant,
    ping_interval: Duration,
    host_gone_reported: bool,
}

impl ClientSession {
    /// Connects to a host and runs the join handshake. A rejection arrives
    /// as [`NetError::JoinRefused`] with the host's reason code.
    pub async fn join(host_addr: &str, settings: JoinSettings) -> Result<Self, NetError> {
        let conn = shared::Connection::connect(host_addr, CONNECT_TIMEOUT_MS).await?;
        let mut link = NetLink::new(conn);
        info!("connected to {}, requesting to join", host_addr);

        link.send(&join_message(&settings)).await?;

        let deadline = Instant::now() + JOIN_DEADLINE;
        let mut pending = VecDeque::new();

        let slot = loop {
            if Instant::now() > deadline {
                return Err(NetError::HandshakeTimeout);
            }

            let msgs = link.pump()?;
            if msgs.is_empty() && !link.is_valid() {
                return Err(NetError::Closed);
            }

            let mut accepted = None;
            for msg in msgs {
                if msg.is(MsgType::Accepted) {
                    let mut r = MessageReader::begin(&msg, MsgType::Accepted)?;
                    let slot = r.u8()?;
                    r.end()?;
                    if slot as usize >= MAX_CONNECTED_PLAYERS {
                        return Err(NetError::Malformed("assigned slot index out of range"));
                    }
                    accepted = Some(slot);
                } else if msg.is(MsgType::Rejected) {
                    let mut r = MessageReader::begin(&msg, MsgType::Rejected)?;
                    let reason = RejectReason::from_u8(r.u8()?)?;
                    r.end()?;
                    return Err(NetError::JoinRefused(reason));
                } else {
                    // Roster snapshots may ride right behind the accept.
                    pending.push_back(msg);
                }
            }

            if let Some(slot) = accepted {
                break slot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        info!("accepted into the session as slot {}", slot);

        let mut players = vec![PlayerInfo::default(); MAX_CONNECTED_PLAYERS];
        players[slot as usize] = PlayerInfo {
            allocated: true,
            name: settings.name.clone(),
            heartbeat: true,
            ..PlayerInfo::default()
        };

        let mut session = ClientSession {
            link,
            slot,
            host_slot: NET_HOST_SLOT,
            players,
            game_flags: [0; 4],
            cipher: None,
            encrypt_all: false,
            files: FileReceiver::new(settings.download_dir.clone()),
            inbox: VecDeque::new(),
            events: VecDeque::new(),
            stats: NetStats::new(),
            last_sent: Instant::now(),
            ping_interval: settings.ping_interval,
            host_gone_reported: false,
        };
        for msg in pending {
            session.handle_inbound(msg);
        }
        Ok(session)
    }

    /// One network tick: pump the host link, apply system traffic, keep the
    /// heartbeat alive.
    pub async fn update(&mut self) {
        match self.link.pump() {
            Ok(msgs) => {
                for msg in msgs {
                    self.handle_inbound(msg);
                }
            }
            Err(e) => {
                warn!("host connection failed: {}", e);
            }
        }

        if !self.link.is_valid() {
            if !self.host_gone_reported {
                self.host_gone_reported = true;
                self.events.push_back(NetEvent::HostDropped);
            }
            return;
        }

        if self.last_sent.elapsed() > self.ping_interval {
            let ping = MessageWriter::begin(MsgType::Ping, NET_HOST_SLOT).end();
            let _ = self.send_message(ping).await;
        }
    }

    fn handle_inbound(&mut self, msg: NetMessage) {
        self.stats.record_recvd(msg.wire_len());

        let msg = if msg.is_encrypted() {
            let Some(plain) = self.decrypt(msg) else {
                return;
            };
            plain
        } else {
            msg
        };

        match MsgType::from_u8(msg.raw_type()) {
            Some(MsgType::PlayerInfo) => self.apply_player_info(&msg),
            Some(MsgType::PlayerJoined) => self.apply_lifecycle(&msg, MsgType::PlayerJoined),
            Some(MsgType::PlayerLeft) => self.apply_player_left(&msg),
            Some(MsgType::PlayerDropped) => self.apply_lifecycle(&msg, MsgType::PlayerDropped),
            Some(MsgType::Kick) => self.apply_kick(&msg),
            Some(MsgType::GameFlags) => self.apply_game_flags(&msg),
            Some(MsgType::File) => self.apply_file_chunk(&msg),
            Some(MsgType::Ping) => {}
            Some(other) => {
                debug!("ignoring unexpected system message {:?}", other);
            }
            None => self.inbox.push_back(msg),
        }
    }

    fn apply_player_info(&mut self, msg: &NetMessage) {
        match parse_player_info(msg) {
            Ok((slot, info, host_slot)) => {
                if let Some(seat) = self.players.get_mut(slot as usize) {
                    *seat = info;
                }
                self.host_slot = host_slot;
            }
            Err(e) => self.protocol_failure("player info", e),
        }
    }

    fn apply_lifecycle(&mut self, msg: &NetMessage, kind: MsgType) {
        let parsed = (|| -> Result<u8, NetError> {
            let mut r = MessageReader::begin(msg, kind)?;
            let slot = r.u8()?;
            r.end()?;
            Ok(slot)
        })();

        match parsed {
            Ok(slot) => match kind {
                MsgType::PlayerJoined => {
                    let name = self
                        .players
                        .get(slot as usize)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    self.events.push_back(NetEvent::PlayerJoined { slot, name });
                }
                MsgType::PlayerDropped => {
                    self.clear_seat(slot);
                    self.events.push_back(NetEvent::PlayerDropped { slot });
                }
                _ => {}
            },
            Err(e) => self.protocol_failure("lifecycle notification", e),
        }
    }

    fn apply_player_left(&mut self, msg: &NetMessage) {
        let parsed = (|| -> Result<(u8, bool), NetError> {
            let mut r = MessageReader::begin(msg, MsgType::PlayerLeft)?;
            let slot = r.u8()?;
            let was_host = r.bool()?;
            r.end()?;
            Ok((slot, was_host))
        })();

        match parsed {
            Ok((slot, was_host)) => {
                self.clear_seat(slot);
                if was_host || slot == self.host_slot {
                    info!("host closed the session");
                    self.link.invalidate();
                } else {
                    self.events.push_back(NetEvent::PlayerLeft { slot });
                }
            }
            Err(e) => self.protocol_failure("leave notification", e),
        }
    }

    fn apply_kick(&mut self, msg: &NetMessage) {
        let parsed = (|| -> Result<u8, NetError> {
            let mut r = MessageReader::begin(msg, MsgType::Kick)?;
            let target = r.u8()?;
            r.end()?;
            Ok(target)
        })();

        match parsed {
            Ok(target) => {
                self.clear_seat(target);
                self.events.push_back(NetEvent::PlayerKicked { slot: target });
                if target == self.slot {
                    info!("kicked from the session");
                    self.link.invalidate();
                }
            }
            Err(e) => self.protocol_failure("kick notification", e),
        }
    }

    fn apply_game_flags(&mut self, msg: &NetMessage) {
        let parsed = (|| -> Result<Vec<i32>, NetError> {
            let mut r = MessageReader::begin(msg, MsgType::GameFlags)?;
            let count = r.u8()? as usize;
            // Never read more flags than there is room for.
            let count = count.min(self.game_flags.len());
            let mut flags = Vec::with_capacity(count);
            for _ in 0..count {
                flags.push(r.i32()?);
            }
            r.end()?;
            Ok(flags)
        })();

        match parsed {
            Ok(flags) => {
                for (i, flag) in flags.into_iter().enumerate() {
                    self.game_flags[i] = flag;
                }
            }
            Err(e) => self.protocol_failure("game flags", e),
        }
    }

    fn apply_file_chunk(&mut self, msg: &NetMessage) {
        match self.files.handle(msg) {
            Ok(FileProgress::AlreadyHave { name }) => {
                self.events.push_back(NetEvent::FileComplete { name });
            }
            Ok(FileProgress::InProgress { name, percent }) => {
                self.events.push_back(NetEvent::FileProgress { name, percent });
            }
            Ok(FileProgress::Complete { name }) => {
                self.events.push_back(NetEvent::FileComplete { name });
            }
            Err(e) => warn!("file transfer failed: {}", e),
        }
    }

    /// A malformed system message from the host means the two ends disagree
    /// about the protocol; the connection is abandoned.
    fn protocol_failure(&mut self, what: &str, e: NetError) {
        warn!("malformed {} from host: {}", what, e);
        self.link.invalidate();
    }

    fn clear_seat(&mut self, slot: u8) {
        if let Some(seat) = self.players.get_mut(slot as usize) {
            *seat = PlayerInfo::default();
        }
    }

    fn decrypt(&self, mut msg: NetMessage) -> Option<NetMessage> {
        let Some(cipher) = &self.cipher else {
            warn!("encrypted message but no session key configured");
            return None;
        };
        match cipher.decrypt(&mut msg) {
            Ok(()) => Some(msg),
            Err(e) => {
                warn!("failed to decrypt message type {}: {}", msg.raw_type(), e);
                None
            }
        }
    }

    async fn send_message(&mut self, mut msg: NetMessage) -> Result<(), NetError> {
        msg.source = self.slot;
        if self.encrypt_all {
            if let Some(cipher) = &self.cipher {
                let _ = cipher.encrypt(&mut msg);
            }
        }
        let len = msg.wire_len();
        self.link.send(&msg).await?;
        self.stats.record_sent(len);
        self.last_sent = Instant::now();
        Ok(())
    }

    // ------------------------------------------------------------ game API

    /// Sends a game-layer message. Everything goes via the host connection;
    /// the host relays unicasts to their destination slot.
    pub async fn send(&mut self, msg: NetMessage) -> Result<(), NetError> {
        self.send_message(msg).await
    }

    /// Convenience for a broadcast to every player.
    pub async fn send_to_all(&mut self, mut msg: NetMessage) -> Result<(), NetError> {
        msg.destination = NET_ALL_PLAYERS;
        self.send_message(msg).await
    }

    pub fn recv(&mut self) -> Option<NetMessage> {
        self.inbox.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<NetEvent> {
        self.events.drain(..).collect()
    }

    /// Updates this player's cosmetic seat fields and announces them.
    pub async fn set_ready(&mut self, ready: bool) -> Result<(), NetError> {
        let slot = self.slot;
        if let Some(seat) = self.players.get_mut(slot as usize) {
            seat.ready = ready;
        }
        let info = self
            .players
            .get(slot as usize)
            .cloned()
            .unwrap_or_default();
        let msg = shared::player::build_player_info(slot, &info, self.host_slot, NET_HOST_SLOT);
        self.send_message(msg).await
    }

    /// Installs the session key shared with the host.
    pub fn set_cipher(&mut self, key: [u32; 4], encrypt_all: bool) {
        self.cipher = Some(NetCipher::new(key));
        self.encrypt_all = encrypt_all;
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn host_slot(&self) -> u8 {
        self.host_slot
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_valid()
    }

    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn game_flag(&self, index: usize) -> i32 {
        self.game_flags.get(index).copied().unwrap_or(0)
    }

    pub fn stats(&mut self) -> &mut NetStats {
        &mut self.stats
    }

    /// Graceful leave: announce it, then close the connection by dropping
    /// the session. In-flight partial data on the host side is discarded
    /// safely.
    pub async fn leave(mut self) {
        let mut w = MessageWriter::begin(MsgType::PlayerLeft, NET_ALL_PLAYERS);
        w.u8(self.slot);
        w.bool(false);
        let msg = w.end();
        if self.send_message(msg).await.is_err() {
            debug!("leave announcement not delivered; closing anyway");
        }
        info!("left the session");
    }
}

fn join_message(settings: &JoinSettings) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::Join, NET_HOST_SLOT);
    w.string(&settings.name, MAX_NAME_LEN);
    w.u32(NETCODE_VERSION_MAJOR);
    w.u32(NETCODE_VERSION_MINOR);
    w.string(&settings.mods, MAX_MODLIST_LEN);
    w.string(&settings.password, MAX_PASSWORD_LEN);
    w.string(&settings.identity, MAX_NAME_LEN);
    w.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_message_field_order() {
        let mut settings = JoinSettings::new("Scout");
        settings.password = "pw".to_string();
        settings.mods = "vanilla".to_string();
        let msg = join_message(&settings);

        let mut r = MessageReader::begin(&msg, MsgType::Join).unwrap();
        assert_eq!(r.string(MAX_NAME_LEN).unwrap(), "Scout");
        assert_eq!(r.u32().unwrap(), NETCODE_VERSION_MAJOR);
        assert_eq!(r.u32().unwrap(), NETCODE_VERSION_MINOR);
        assert_eq!(r.string(MAX_MODLIST_LEN).unwrap(), "vanilla");
        assert_eq!(r.string(MAX_PASSWORD_LEN).unwrap(), "pw");
        assert_eq!(r.string(MAX_NAME_LEN).unwrap(), "");
        r.end().unwrap();
    }

    #[test]
    fn test_join_settings_defaults() {
        let settings = JoinSettings::new("Player");
        assert_eq!(settings.name, "Player");
        assert!(settings.password.is_empty());
        assert!(settings.mods.is_empty());
    }
}
