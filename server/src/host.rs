//! The host session: accept, validate, route, watch.
//!
//! One poll-driven `update` per network tick covers the whole host role:
//! accepting candidate connections into the bounded temporary pool,
//! validating join requests, pumping every player link, routing inbound
//! traffic (consume, relay, or both), checking liveness, and finally
//! draining the queued notifications. Lifecycle announcements are never
//! written from inside connection iteration; they go through the outbound
//! queue and leave after the receive pass completes.
//!
//! The `source` byte of inbound messages is never trusted: it is replaced
//! with the slot index of the connection the bytes arrived on before any
//! routing or dispatch. The connection is the identity.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use shared::player::{build_player_info, parse_player_info};
use shared::{
    GameAdvert, Listener, MessageReader, MessageWriter, MsgType, NetCipher, NetError, NetEvent,
    NetLink, NetMessage, NetStats, PlayerInfo, RejectReason, MAX_CONNECTED_PLAYERS,
    MAX_MODLIST_LEN, MAX_NAME_LEN, MAX_PASSWORD_LEN, MAX_TMP_SOCKETS, NETCODE_VERSION_MAJOR,
    NETCODE_VERSION_MINOR, NET_ALL_PLAYERS,
};

use crate::banlist::{Decision, PermissionTable};
use crate::lobby::LobbyRegistration;
use crate::registry::PlayerRegistry;

/// How long a candidate connection may sit in the temporary pool without
/// presenting a join request.
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Readiness-poll timeout for the per-tick sweep over player connections.
/// Zero keeps the tick non-blocking; the game loop provides the cadence.
const NET_READ_TIMEOUT_MS: u64 = 0;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub session_name: String,
    pub player_name: String,
    /// Port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    pub max_players: u32,
    pub password: Option<String>,
    pub mods: String,
    pub lobby_addr: Option<String>,
    pub user_flags: [i32; 4],
    pub ban_file: Option<PathBuf>,
    /// Traffic silence before the heartbeat flag is cleared.
    pub heartbeat_interval: Duration,
    /// Grace period after a missed heartbeat before the slot is dropped.
    pub heartbeat_grace: Duration,
}

impl HostConfig {
    pub fn new(session_name: &str, player_name: &str) -> Self {
        HostConfig {
            session_name: session_name.to_string(),
            player_name: player_name.to_string(),
            port: 0,
            max_players: MAX_CONNECTED_PLAYERS as u32,
            password: None,
            mods: String::new(),
            lobby_addr: None,
            user_flags: [0; 4],
            ban_file: None,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_grace: Duration::from_secs(15),
        }
    }
}

/// How a slot is vacated. All three converge on the same deallocation but
/// broadcast distinct notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveKind {
    Left,
    Dropped,
    Kicked,
}

/// A connection that has been accepted but not yet joined.
struct Candidate {
    link: NetLink,
    addr: SocketAddr,
    since: Instant,
}

struct JoinRequest {
    name: String,
    major: u32,
    minor: u32,
    mods: String,
    password: String,
    /// Public-identity string; checked against the permission table. The
    /// trailing hash field of the request is carried here.
    identity: String,
}

pub struct HostSession {
    listener: Listener,
    registry: PlayerRegistry,
    candidates: Vec<Candidate>,
    bans: PermissionTable,
    advert: GameAdvert,
    config: HostConfig,
    lobby: LobbyRegistration,
    cipher: Option<NetCipher>,
    encrypt_all: bool,
    game_flags: [i32; 4],
    inbox: VecDeque<NetMessage>,
    events: VecDeque<NetEvent>,
    /// Notifications queued during a receive pass, drained afterwards.
    pending_broadcasts: VecDeque<NetMessage>,
    stats: NetStats,
    allow_joining: bool,
    lobby_dirty: bool,
    started: Instant,
}

impl HostSession {
    /// Binds the listener, seats the host in slot 0 and registers with the
    /// lobby server. An unreachable lobby degrades to unlisted hosting.
    pub async fn host(config: HostConfig) -> Result<Self, NetError> {
        let listener = Listener::bind(config.port).await?;
        let registry = PlayerRegistry::new(&config.player_name);

        let bans = match &config.ban_file {
            Some(path) => PermissionTable::load(path).unwrap_or_else(|e| {
                warn!("could not load ban list {}: {}", path.display(), e);
                PermissionTable::new()
            }),
            None => PermissionTable::new(),
        };

        let max_players = config.max_players.clamp(1, MAX_CONNECTED_PLAYERS as u32);
        let advert = GameAdvert {
            advert_version: shared::gamestruct::ADVERT_VERSION,
            name: config.session_name.clone(),
            host: String::new(),
            secondary_hosts: [String::new(), String::new()],
            version_major: NETCODE_VERSION_MAJOR,
            version_minor: NETCODE_VERSION_MINOR,
            max_players,
            current_players: 1,
            user_flags: config.user_flags,
            password_required: config.password.is_some(),
            // Local fallback id; replaced by the lobby-assigned one.
            game_id: rand::random(),
            mods: config.mods.clone(),
        };

        let lobby = LobbyRegistration::new(config.lobby_addr.clone());
        let game_flags = config.user_flags;

        let mut session = HostSession {
            listener,
            registry,
            candidates: Vec::new(),
            bans,
            advert,
            config,
            lobby,
            cipher: None,
            encrypt_all: false,
            game_flags,
            inbox: VecDeque::new(),
            events: VecDeque::new(),
            pending_broadcasts: VecDeque::new(),
            stats: NetStats::new(),
            allow_joining: true,
            lobby_dirty: false,
            started: Instant::now(),
        };
        session.lobby.register(&mut session.advert).await;

        let addr = session.listener.local_addr()?;
        info!(
            "hosting \"{}\" on port {} (game id {})",
            session.advert.name,
            addr.port(),
            session.advert.game_id
        );
        Ok(session)
    }

    /// One network tick. Connection-level failures terminate at most the
    /// connection they occurred on; nothing here fails the session.
    pub async fn update(&mut self) {
        self.accept_candidates().await;
        self.pump_candidates().await;
        self.pump_players().await;
        self.check_heartbeats();
        self.flush_outbound().await;
    }

    // ---------------------------------------------------------------- accept

    async fn accept_candidates(&mut self) {
        if !self.allow_joining {
            return;
        }
        self.lobby.register(&mut self.advert).await;

        while self.candidates.len() < MAX_TMP_SOCKETS {
            let Some((conn, addr)) = self.listener.try_accept().await else {
                break;
            };
            // The permission table speaks before any protocol bytes do.
            if self.bans.is_banned(&addr.ip().to_string()) {
                info!("refusing connection from banned address {}", addr);
                continue;
            }
            debug!("candidate connection from {}", addr);
            self.candidates.push(Candidate {
                link: NetLink::new(conn),
                addr,
                since: Instant::now(),
            });
        }
    }

    async fn pump_candidates(&mut self) {
        let mut kept = Vec::with_capacity(self.candidates.len());
        let mut joins = Vec::new();

        for mut cand in std::mem::take(&mut self.candidates) {
            match cand.link.pump() {
                Err(e) => {
                    debug!("candidate {} dropped before joining: {}", cand.addr, e);
                }
                Ok(mut msgs) => {
                    if msgs.is_empty() {
                        if !cand.link.is_valid() {
                            debug!("candidate {} disconnected before joining", cand.addr);
                        } else if cand.since.elapsed() > JOIN_HANDSHAKE_TIMEOUT {
                            debug!("candidate {} timed out before joining", cand.addr);
                        } else {
                            kept.push(cand);
                        }
                    } else {
                        let first = msgs.remove(0);
                        if first.is(MsgType::Join) {
                            joins.push((cand, first));
                        } else {
                            warn!(
                                "candidate {} sent message type {} before joining",
                                cand.addr,
                                first.raw_type()
                            );
                        }
                    }
                }
            }
        }

        self.candidates = kept;
        for (cand, msg) in joins {
            self.handle_join(cand, msg).await;
        }
    }

    async fn handle_join(&mut self, mut cand: Candidate, msg: NetMessage) {
        let req = match parse_join(&msg) {
            Ok(req) => req,
            Err(e) => {
                warn!("malformed join request from {}: {}", cand.addr, e);
                return;
            }
        };

        if let Some(reason) = self.validate_join(&cand.addr, &req) {
            info!(
                "rejecting join of \"{}\" from {}: {}",
                req.name,
                cand.addr,
                reason.describe()
            );
            let _ = cand.link.send(&rejected_message(reason)).await;
            return;
        }

        let Some(slot) = self.registry.allocate(&req.name) else {
            // The capacity check above makes this unreachable, but the
            // rejection path must exist for it regardless.
            let _ = cand.link.send(&rejected_message(RejectReason::Full)).await;
            return;
        };
        let addr = cand.addr;
        self.registry.attach_link(slot, cand.link);

        let host_slot = self.registry.host_slot();
        self.send_system_to(slot, accepted_message(slot)).await;

        // Snapshot of every other allocated seat for the newcomer.
        for other in self.registry.allocated_slots() {
            if other == slot {
                continue;
            }
            let Some(info) = self.registry.get(other).map(|s| s.info.clone()) else {
                continue;
            };
            self.send_system_to(slot, build_player_info(other, &info, host_slot, slot))
                .await;
        }

        // Refresh everyone's seat info, then announce the newcomer so the
        // join notice lands on an up-to-date roster.
        self.queue_all_player_info();
        self.pending_broadcasts.push_back(player_joined_message(slot));

        self.advert.current_players = self.registry.count() as u32;
        self.lobby_dirty = true;
        self.events.push_back(NetEvent::PlayerJoined {
            slot,
            name: req.name.clone(),
        });
        info!("player \"{}\" joined from {} into slot {}", req.name, addr, slot);
    }

    /// Join validation, in fixed order: ban list, protocol version,
    /// password, mod list, capacity. No slot is consumed on any failure.
    fn validate_join(&self, addr: &SocketAddr, req: &JoinRequest) -> Option<RejectReason> {
        if self.bans.is_banned(&addr.ip().to_string()) {
            return Some(RejectReason::Banned);
        }
        if !req.identity.is_empty() && self.bans.decide(&req.identity) == Decision::Deny {
            return Some(RejectReason::Banned);
        }
        if req.major != NETCODE_VERSION_MAJOR || req.minor != NETCODE_VERSION_MINOR {
            return Some(RejectReason::WrongVersion);
        }
        if let Some(password) = &self.config.password {
            if &req.password != password {
                return Some(RejectReason::WrongPassword);
            }
        }
        if req.mods != self.config.mods {
            return Some(RejectReason::WrongData);
        }
        if self.registry.count() >= self.advert.max_players as usize {
            return Some(RejectReason::Full);
        }
        None
    }

    // ----------------------------------------------------------------- pump

    async fn pump_players(&mut self) {
        let host_slot = self.registry.host_slot();

        // One readiness poll covers the whole set of player connections;
        // only slots with pending data get pumped this tick.
        let linked: Vec<u8> = self
            .registry
            .allocated_slots()
            .into_iter()
            .filter(|&s| s != host_slot)
            .filter(|&s| self.registry.get(s).map_or(false, |seat| seat.link.is_some()))
            .collect();
        let ready_slots: Vec<u8> = {
            let conns: Vec<&shared::Connection> = linked
                .iter()
                .filter_map(|&s| self.registry.get(s))
                .filter_map(|seat| seat.link.as_ref())
                .map(|link| link.connection())
                .collect();
            shared::transport::poll_readable(&conns, NET_READ_TIMEOUT_MS)
                .await
                .into_iter()
                .map(|i| linked[i])
                .collect()
        };

        for slot in ready_slots {
            if !self.registry.is_allocated(slot) {
                continue;
            }

            let pumped = {
                let Some(seat) = self.registry.get_mut(slot) else {
                    continue;
                };
                let Some(link) = seat.link.as_mut() else {
                    continue;
                };
                match link.pump() {
                    Ok(msgs) => {
                        if !msgs.is_empty() {
                            seat.last_traffic = Instant::now();
                            seat.info.heartbeat = true;
                            seat.info.heart_attack_at = 0;
                        }
                        Ok(msgs)
                    }
                    Err(e) => Err(e),
                }
            };

            match pumped {
                Ok(msgs) => {
                    for msg in msgs {
                        self.route_inbound(slot, msg).await;
                    }
                    let link_dead = self
                        .registry
                        .get(slot)
                        .and_then(|s| s.link.as_ref())
                        .map_or(false, |l| !l.is_valid());
                    if link_dead && self.registry.is_allocated(slot) {
                        info!("connection to slot {} lost", slot);
                        self.drop_player(slot, LeaveKind::Dropped);
                    }
                }
                Err(e) => {
                    warn!("protocol violation from slot {}: {}", slot, e);
                    self.drop_player(slot, LeaveKind::Dropped);
                }
            }
        }

        // Connections invalidated outside a read (failed writes) never show
        // up as readable; sweep them here.
        for slot in linked {
            let invalid = self
                .registry
                .get(slot)
                .and_then(|s| s.link.as_ref())
                .map_or(false, |l| !l.is_valid());
            if invalid && self.registry.is_allocated(slot) {
                info!("connection to slot {} lost", slot);
                self.drop_player(slot, LeaveKind::Dropped);
            }
        }
    }

    async fn route_inbound(&mut self, from: u8, mut msg: NetMessage) {
        self.stats.record_recvd(msg.wire_len());
        // Connection identity is authoritative; the claimed source is not.
        msg.source = from;

        let host_slot = self.registry.host_slot();
        let system = MsgType::from_u8(msg.raw_type()).is_some();

        if msg.destination == NET_ALL_PLAYERS {
            if system {
                // Lifecycle traffic is consumed here; the host re-announces
                // authoritatively from its outbound queue.
                self.dispatch_system(from, &msg);
            } else {
                self.relay_to_all_except(from, &msg).await;
                if let Some(plain) = self.decrypt_for_local(msg) {
                    self.inbox.push_back(plain);
                }
            }
        } else if msg.destination == host_slot {
            if system {
                self.dispatch_system(from, &msg);
            } else if let Some(plain) = self.decrypt_for_local(msg) {
                self.inbox.push_back(plain);
            }
        } else {
            // Pure relay: the body is never decoded, so unknown message
            // types survive the hop.
            self.relay_to(msg.destination, &msg).await;
        }
    }

    fn dispatch_system(&mut self, from: u8, msg: &NetMessage) {
        let msg = if msg.is_encrypted() {
            match self.decrypt_for_local(msg.clone()) {
                Some(m) => m,
                None => {
                    warn!("undecryptable system message from slot {}", from);
                    self.drop_player(from, LeaveKind::Dropped);
                    return;
                }
            }
        } else {
            msg.clone()
        };

        match MsgType::from_u8(msg.raw_type()) {
            Some(MsgType::PlayerLeft) => self.handle_player_left(from, &msg),
            Some(MsgType::Kick) => self.handle_kick_attempt(from, &msg),
            Some(MsgType::PlayerInfo) => self.handle_player_info_update(from, &msg),
            Some(MsgType::Ping) => {} // traffic alone refreshes the heartbeat
            Some(other) => {
                warn!("unexpected system message {:?} from slot {}", other, from);
            }
            None => {}
        }
    }

    fn handle_player_left(&mut self, from: u8, msg: &NetMessage) {
        let parsed = (|| -> Result<(u8, bool), NetError> {
            let mut r = MessageReader::begin(msg, MsgType::PlayerLeft)?;
            let slot = r.u8()?;
            let was_host = r.bool()?;
            r.end()?;
            Ok((slot, was_host))
        })();

        match parsed {
            Ok((claimed, _was_host)) => {
                if claimed != from {
                    debug!(
                        "slot {} announced a leave for slot {}; using the connection identity",
                        from, claimed
                    );
                }
                self.drop_player(from, LeaveKind::Left);
            }
            Err(e) => {
                warn!("malformed leave message from slot {}: {}", from, e);
                self.drop_player(from, LeaveKind::Dropped);
            }
        }
    }

    fn handle_kick_attempt(&mut self, from: u8, msg: &NetMessage) {
        let target = match parse_kick(msg) {
            Ok(t) => t,
            Err(e) => {
                warn!("malformed kick message from slot {}: {}", from, e);
                self.drop_player(from, LeaveKind::Dropped);
                return;
            }
        };

        if target == self.registry.host_slot() {
            // Trying to evict the host is itself the violation; the sender
            // is kicked and banned instead.
            warn!("slot {} attempted to kick the host; kicking the sender", from);
            self.kick(from);
        } else {
            warn!("ignoring kick request from non-host slot {}", from);
        }
    }

    fn handle_player_info_update(&mut self, from: u8, msg: &NetMessage) {
        match parse_player_info(msg) {
            Ok((slot, update, _host)) => {
                if slot != from {
                    warn!("slot {} tried to update player info of slot {}", from, slot);
                    return;
                }
                if let Some(seat) = self.registry.get_mut(from) {
                    // Only the cosmetic fields are client-owned; allocation
                    // and liveness stay authoritative here.
                    seat.info.name = update.name;
                    seat.info.colour = update.colour;
                    seat.info.position = update.position;
                    seat.info.team = update.team;
                    seat.info.ready = update.ready;
                }
                self.queue_player_info(from);
            }
            Err(e) => {
                warn!("malformed player info from slot {}: {}", from, e);
                self.drop_player(from, LeaveKind::Dropped);
            }
        }
    }

    // ---------------------------------------------------------------- sends

    async fn write_to_slot(&mut self, slot: u8, wire: &[u8]) {
        let Some(seat) = self.registry.get_mut(slot) else {
            return;
        };
        let Some(link) = seat.link.as_mut() else {
            return;
        };
        match link.send_raw(wire).await {
            Ok(()) => self.stats.record_sent(wire.len()),
            Err(e) => debug!("write to slot {} failed: {}", slot, e),
        }
    }

    async fn send_system_to(&mut self, slot: u8, mut msg: NetMessage) {
        msg.source = self.registry.host_slot();
        self.encrypt_outbound(&mut msg);
        let wire = msg.to_wire();
        self.write_to_slot(slot, &wire).await;
    }

    async fn relay_to(&mut self, destination: u8, msg: &NetMessage) {
        if !self.registry.is_allocated(destination) {
            debug!(
                "cannot relay message type {} to unallocated slot {}",
                msg.raw_type(),
                destination
            );
            return;
        }
        let wire = msg.to_wire();
        self.write_to_slot(destination, &wire).await;
    }

    async fn relay_to_all_except(&mut self, skip: u8, msg: &NetMessage) {
        let host_slot = self.registry.host_slot();
        let wire = msg.to_wire();
        for slot in self.registry.allocated_slots() {
            if slot == skip || slot == host_slot {
                continue;
            }
            self.write_to_slot(slot, &wire).await;
        }
    }

    async fn flush_outbound(&mut self) {
        while let Some(mut msg) = self.pending_broadcasts.pop_front() {
            msg.source = self.registry.host_slot();
            msg.destination = NET_ALL_PLAYERS;
            self.encrypt_outbound(&mut msg);
            let wire = msg.to_wire();
            let host_slot = self.registry.host_slot();
            for slot in self.registry.allocated_slots() {
                if slot == host_slot {
                    continue;
                }
                self.write_to_slot(slot, &wire).await;
            }
        }

        if self.lobby_dirty {
            self.lobby.update(&self.advert).await;
            self.lobby_dirty = false;
        }
    }

    fn queue_player_info(&mut self, slot: u8) {
        let host_slot = self.registry.host_slot();
        if let Some(info) = self.registry.get(slot).map(|s| s.info.clone()) {
            self.pending_broadcasts
                .push_back(build_player_info(slot, &info, host_slot, NET_ALL_PLAYERS));
        }
    }

    fn queue_all_player_info(&mut self) {
        for slot in self.registry.allocated_slots() {
            self.queue_player_info(slot);
        }
    }

    fn encrypt_outbound(&self, msg: &mut NetMessage) {
        if !self.encrypt_all {
            return;
        }
        if let Some(cipher) = &self.cipher {
            if let Err(e) = cipher.encrypt(msg) {
                debug!("leaving message type {} in the clear: {}", msg.raw_type(), e);
            }
        }
    }

    fn decrypt_for_local(&self, mut msg: NetMessage) -> Option<NetMessage> {
        if !msg.is_encrypted() {
            return Some(msg);
        }
        let cipher = self.cipher.as_ref()?;
        match cipher.decrypt(&mut msg) {
            Ok(()) => Some(msg),
            Err(e) => {
                warn!("failed to decrypt message type {}: {}", msg.raw_type(), e);
                None
            }
        }
    }

    // ------------------------------------------------------------- liveness

    fn check_heartbeats(&mut self) {
        let host_slot = self.registry.host_slot();
        let now_ms = self.started.elapsed().as_millis() as u64;
        let grace_ms = self.config.heartbeat_grace.as_millis() as u64;
        let interval = self.config.heartbeat_interval;
        let mut casualties = Vec::new();

        for slot in self.registry.allocated_slots() {
            if slot == host_slot {
                continue;
            }
            let Some(seat) = self.registry.get_mut(slot) else {
                continue;
            };
            // Seats without a connection are locally controlled; no
            // liveness to track.
            if seat.link.is_none() {
                continue;
            }

            if seat.last_traffic.elapsed() > interval {
                seat.info.heartbeat = false;
            }

            if seat.info.heartbeat {
                seat.info.heart_attack_at = 0;
            } else if seat.info.heart_attack_at == 0 {
                seat.info.heart_attack_at = now_ms.max(1);
                debug!("slot {} missed its heartbeat", slot);
            } else if now_ms.saturating_sub(seat.info.heart_attack_at) > grace_ms {
                seat.info.kick = true;
            }

            if seat.info.kick {
                casualties.push(slot);
            }
        }

        for slot in casualties {
            self.drop_player(slot, LeaveKind::Dropped);
        }
    }

    /// The single deallocation primitive all three removal paths share.
    fn drop_player(&mut self, slot: u8, kind: LeaveKind) {
        if slot == self.registry.host_slot() || !self.registry.is_allocated(slot) {
            return;
        }
        let name = self
            .registry
            .get(slot)
            .map(|s| s.info.name.clone())
            .unwrap_or_default();

        match kind {
            LeaveKind::Left => {
                info!("player \"{}\" (slot {}) left the session", name, slot);
                self.pending_broadcasts.push_back(player_left_message(slot, false));
                self.events.push_back(NetEvent::PlayerLeft { slot });
            }
            LeaveKind::Dropped => {
                warn!("player \"{}\" (slot {}) dropped: no longer responding", name, slot);
                self.pending_broadcasts.push_back(player_dropped_message(slot));
                self.events.push_back(NetEvent::PlayerDropped { slot });
            }
            LeaveKind::Kicked => {
                info!("player \"{}\" (slot {}) kicked", name, slot);
                self.pending_broadcasts.push_back(kick_message(slot));
                self.events.push_back(NetEvent::PlayerKicked { slot });
            }
        }

        self.registry.free(slot);
        self.advert.current_players = self.registry.count() as u32;
        self.lobby_dirty = true;
    }

    // ------------------------------------------------------------ game API

    /// Sends a game-layer message to one slot or to all players. This is the
    /// collaborator boundary: the layer above never touches sockets.
    pub async fn send(&mut self, mut msg: NetMessage) -> Result<(), NetError> {
        let host_slot = self.registry.host_slot();
        msg.source = host_slot;
        self.encrypt_outbound(&mut msg);

        if msg.destination == NET_ALL_PLAYERS {
            let wire = msg.to_wire();
            for slot in self.registry.allocated_slots() {
                if slot == host_slot {
                    continue;
                }
                self.write_to_slot(slot, &wire).await;
            }
            Ok(())
        } else if msg.destination == host_slot {
            // Loopback; mostly useful to exercise the game layer locally.
            if let Some(plain) = self.decrypt_for_local(msg) {
                self.inbox.push_back(plain);
            }
            Ok(())
        } else if self.registry.is_allocated(msg.destination) {
            let wire = msg.to_wire();
            self.write_to_slot(msg.destination, &wire).await;
            Ok(())
        } else {
            Err(NetError::Malformed("destination slot is not allocated"))
        }
    }

    /// Next game-layer message, if any arrived.
    pub fn recv(&mut self) -> Option<NetMessage> {
        self.inbox.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<NetEvent> {
        self.events.drain(..).collect()
    }

    /// Administrative removal: bans the address, then drops the slot.
    pub fn kick(&mut self, slot: u8) {
        if slot == self.registry.host_slot() || !self.registry.is_allocated(slot) {
            return;
        }
        let name = self
            .registry
            .get(slot)
            .map(|s| s.info.name.clone())
            .unwrap_or_default();
        if let Some(addr) = self.registry.get(slot).and_then(|s| s.link.as_ref()).map(|l| l.peer_addr())
        {
            self.bans
                .deny(&addr.ip().to_string(), &format!("kicked: {}", name));
            if let Some(path) = &self.config.ban_file {
                if let Err(e) = self.bans.save(path) {
                    warn!("could not persist ban list {}: {}", path.display(), e);
                }
            }
        }
        self.drop_player(slot, LeaveKind::Kicked);
    }

    pub fn set_allow_joining(&mut self, allow: bool) {
        if self.allow_joining && !allow {
            self.lobby.unregister();
        }
        self.allow_joining = allow;
    }

    /// Installs the session key. With `encrypt_all`, every outbound message
    /// except file payloads is mangled.
    pub fn set_cipher(&mut self, key: [u32; 4], encrypt_all: bool) {
        self.cipher = Some(NetCipher::new(key));
        self.encrypt_all = encrypt_all;
    }

    /// Sets one of the four session flags and broadcasts the new set.
    pub fn set_game_flag(&mut self, index: usize, value: i32) -> bool {
        if index >= self.game_flags.len() {
            return false;
        }
        self.game_flags[index] = value;
        self.advert.user_flags = self.game_flags;
        self.lobby_dirty = true;
        self.pending_broadcasts
            .push_back(game_flags_message(&self.game_flags));
        true
    }

    pub fn game_flag(&self, index: usize) -> i32 {
        self.game_flags.get(index).copied().unwrap_or(0)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        self.listener.local_addr()
    }

    pub fn host_slot(&self) -> u8 {
        self.registry.host_slot()
    }

    pub fn player_count(&self) -> usize {
        self.registry.count()
    }

    pub fn roster(&self) -> Vec<PlayerInfo> {
        self.registry.roster()
    }

    pub fn advert(&self) -> &GameAdvert {
        &self.advert
    }

    pub fn stats(&mut self) -> &mut NetStats {
        &mut self.stats
    }

    pub fn is_listed(&self) -> bool {
        self.lobby.is_registered()
    }

    /// Announces the host's own departure and closes everything down.
    pub async fn shutdown(mut self) {
        let host_slot = self.registry.host_slot();
        self.pending_broadcasts
            .push_back(player_left_message(host_slot, true));
        self.flush_outbound().await;
        self.lobby.unregister();
        info!("session \"{}\" closed", self.advert.name);
    }
}

// ----------------------------------------------------------- wire building

fn parse_join(msg: &NetMessage) -> Result<JoinRequest, NetError> {
    let mut r = MessageReader::begin(msg, MsgType::Join)?;
    let req = JoinRequest {
        name: r.string(MAX_NAME_LEN)?,
        major: r.u32()?,
        minor: r.u32()?,
        mods: r.string(MAX_MODLIST_LEN)?,
        password: r.string(MAX_PASSWORD_LEN)?,
        identity: r.string(MAX_NAME_LEN)?,
    };
    r.end()?;
    Ok(req)
}

fn parse_kick(msg: &NetMessage) -> Result<u8, NetError> {
    let mut r = MessageReader::begin(msg, MsgType::Kick)?;
    let target = r.u8()?;
    r.end()?;
    Ok(target)
}

fn accepted_message(slot: u8) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::Accepted, slot);
    w.u8(slot);
    w.end()
}

fn rejected_message(reason: RejectReason) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::Rejected, NET_ALL_PLAYERS);
    w.u8(reason as u8);
    w.end()
}

fn player_joined_message(slot: u8) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::PlayerJoined, NET_ALL_PLAYERS);
    w.u8(slot);
    w.end()
}

fn player_left_message(slot: u8, was_host: bool) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::PlayerLeft, NET_ALL_PLAYERS);
    w.u8(slot);
    w.bool(was_host);
    w.end()
}

fn player_dropped_message(slot: u8) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::PlayerDropped, NET_ALL_PLAYERS);
    w.u8(slot);
    w.end()
}

fn kick_message(target: u8) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::Kick, NET_ALL_PLAYERS);
    w.u8(target);
    w.end()
}

fn game_flags_message(flags: &[i32; 4]) -> NetMessage {
    let mut w = MessageWriter::begin(MsgType::GameFlags, NET_ALL_PLAYERS);
    w.u8(flags.len() as u8);
    for flag in flags {
        w.i32(*flag);
    }
    w.end()
}
