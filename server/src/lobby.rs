//! Registration with the lobby (directory) server.
//!
//! A short-lived secondary connection, entirely separate from the
//! player-facing listener. On first registration the host asks the lobby
//! for a game id (`gaId`), then publishes its advertisement (`addg`); while
//! the connection stays open the session remains listed, and later
//! advertisement updates are re-sent on the same socket. Every failure
//! degrades to "game not listed": a latch stops further attempts, hosting
//! itself continues unaffected.

use log::{debug, info, warn};

use shared::gamestruct::{CMD_ADD_GAME, CMD_GAME_ID};
use shared::{Connection, GameAdvert, NetError, CONNECT_TIMEOUT_MS, LOBBY_RESPONSE_TIMEOUT_MS};

pub struct LobbyRegistration {
    addr: Option<String>,
    conn: Option<Connection>,
    registered: bool,
    /// Set after the first failure; no retry storm, no blocked hosting.
    unreachable: bool,
}

impl LobbyRegistration {
    pub fn new(addr: Option<String>) -> Self {
        LobbyRegistration {
            addr,
            conn: None,
            registered: false,
            unreachable: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Registers the session, once. Safe to call every tick; it does work
    /// only on the first call and after an `unregister`.
    pub async fn register(&mut self, advert: &mut GameAdvert) {
        let Some(addr) = self.addr.clone() else {
            return;
        };
        if self.registered || self.unreachable {
            return;
        }

        match self.try_register(&addr, advert).await {
            Ok(()) => {
                self.registered = true;
                info!(
                    "session listed with lobby {} as game id {}",
                    addr, advert.game_id
                );
            }
            Err(e) => {
                warn!("lobby server {} unavailable, hosting unlisted: {}", addr, e);
                self.conn = None;
                self.unreachable = true;
            }
        }
    }

    async fn try_register(&mut self, addr: &str, advert: &mut GameAdvert) -> Result<(), NetError> {
        let mut conn = Connection::connect(addr, CONNECT_TIMEOUT_MS).await?;

        // Ask the lobby for our game id first.
        conn.write_all(CMD_GAME_ID).await?;
        let mut id = [0u8; 4];
        conn.read_exact(&mut id, LOBBY_RESPONSE_TIMEOUT_MS).await?;
        advert.game_id = u32::from_be_bytes(id);

        conn.write_all(CMD_ADD_GAME).await?;
        conn.write_all(&advert.write_wire()).await?;

        self.conn = Some(conn);
        Ok(())
    }

    /// Re-sends the advertisement (player counts change on every join and
    /// leave). A dead lobby connection unlists the session quietly.
    pub async fn update(&mut self, advert: &GameAdvert) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if let Err(e) = conn.write_all(&advert.write_wire()).await {
            warn!("lost lobby connection, session no longer listed: {}", e);
            self.conn = None;
            self.registered = false;
        } else {
            debug!("lobby record updated ({} players)", advert.current_players);
        }
    }

    /// Closing the socket is the delisting; the lobby drops the record when
    /// the connection goes away.
    pub fn unregister(&mut self) {
        if self.registered {
            debug!("unregistering from lobby");
        }
        self.conn = None;
        self.registered = false;
        self.unreachable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::gamestruct::{ADVERT_WIRE_SIZE, LOBBY_COMMAND_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn advert() -> GameAdvert {
        GameAdvert {
            name: "listed game".to_string(),
            max_players: 8,
            current_players: 1,
            ..GameAdvert::default()
        }
    }

    /// Minimal in-test directory server: answers gaId and swallows addg.
    async fn lobby_stub() -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut cmd = [0u8; LOBBY_COMMAND_LEN];
            sock.read_exact(&mut cmd).await.unwrap();
            assert_eq!(&cmd, CMD_GAME_ID);
            sock.write_all(&777u32.to_be_bytes()).await.unwrap();

            sock.read_exact(&mut cmd).await.unwrap();
            assert_eq!(&cmd, CMD_ADD_GAME);
            let mut record = vec![0u8; ADVERT_WIRE_SIZE];
            sock.read_exact(&mut record).await.unwrap();
            record
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_register_obtains_game_id_and_publishes() {
        let (addr, stub) = lobby_stub().await;
        let mut lobby = LobbyRegistration::new(Some(addr));
        let mut advert = advert();

        lobby.register(&mut advert).await;
        assert!(lobby.is_registered());
        assert_eq!(advert.game_id, 777);

        let record = stub.await.unwrap();
        let published = GameAdvert::read_wire(&record).unwrap();
        assert_eq!(published.name, "listed game");
        assert_eq!(published.game_id, 777);
    }

    #[tokio::test]
    async fn test_unreachable_lobby_degrades_gracefully() {
        // TEST-NET address, nothing listens there.
        let mut lobby = LobbyRegistration::new(Some("192.0.2.1:9998".to_string()));
        let mut advert = advert();

        lobby.register(&mut advert).await;
        assert!(!lobby.is_registered());

        // The latch prevents repeated connection attempts.
        lobby.register(&mut advert).await;
        assert!(!lobby.is_registered());
    }

    #[tokio::test]
    async fn test_no_lobby_configured_is_a_no_op() {
        let mut lobby = LobbyRegistration::new(None);
        let mut advert = advert();
        lobby.register(&mut advert).await;
        assert!(!lobby.is_registered());
        assert_eq!(advert.game_id, 0);
    }

    #[tokio::test]
    async fn test_register_is_idempotent_while_listed() {
        let (addr, stub) = lobby_stub().await;
        let mut lobby = LobbyRegistration::new(Some(addr));
        let mut advert = advert();

        lobby.register(&mut advert).await;
        let id = advert.game_id;
        // A second call must not redo the exchange.
        lobby.register(&mut advert).await;
        assert_eq!(advert.game_id, id);
        stub.await.unwrap();
    }
}
