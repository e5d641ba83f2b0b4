use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

use server::{FileSender, HostConfig, HostSession};
use shared::{NetEvent, MAX_CONNECTED_PLAYERS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session name shown in the lobby listing
    #[arg(short = 'n', long, default_value = "Open skirmish")]
    name: String,

    /// Name of the hosting player
    #[arg(short = 'p', long, default_value = "Host")]
    player: String,

    /// Port to listen on
    #[arg(long, default_value = "2100")]
    port: u16,

    /// Maximum number of players, including the host
    #[arg(short = 'm', long, default_value_t = MAX_CONNECTED_PLAYERS as u32)]
    max_players: u32,

    /// Session password; joins must present it
    #[arg(long)]
    password: Option<String>,

    /// Mod list joiners must match exactly
    #[arg(long, default_value = "")]
    mods: String,

    /// Lobby server to advertise on, e.g. lobby.example.net:9990
    #[arg(short = 'l', long)]
    lobby: Option<String>,

    /// Ban list file, persisted across sessions
    #[arg(long)]
    ban_file: Option<PathBuf>,

    /// Map file sent to every player that joins
    #[arg(long)]
    map: Option<PathBuf>,

    /// Network ticks per second
    #[arg(short = 't', long, default_value = "10")]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = HostConfig::new(&args.name, &args.player);
    config.port = args.port;
    config.max_players = args.max_players;
    config.password = args.password.clone();
    config.mods = args.mods.clone();
    config.lobby_addr = args.lobby.clone();
    config.ban_file = args.ban_file.clone();

    let mut host = HostSession::host(config).await?;
    info!("session up; waiting for players");

    let mut ticker = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));
    let mut transfers: Vec<FileSender> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                host.update().await;

                for event in host.take_events() {
                    match &event {
                        NetEvent::PlayerJoined { slot, name } => {
                            info!("[{}] {} joined", slot, name);
                            if let Some(map) = &args.map {
                                match FileSender::open(map, *slot) {
                                    Ok(sender) => transfers.push(sender),
                                    Err(e) => debug!("map transfer not started: {}", e),
                                }
                            }
                        }
                        other => info!("{:?}", other),
                    }
                }

                // Push at most one chunk per transfer per tick.
                let mut still_sending = Vec::new();
                for mut sender in transfers.drain(..) {
                    match sender.next_chunk() {
                        Ok(Some((msg, percent))) => {
                            debug!("{}: {:.0}%", sender.name(), percent);
                            if host.send(msg).await.is_err() {
                                debug!("{}: receiver gone, transfer abandoned", sender.name());
                            } else if !sender.is_complete() {
                                still_sending.push(sender);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!("map transfer aborted: {}", e),
                    }
                }
                transfers = still_sending;

                while let Some(msg) = host.recv() {
                    debug!(
                        "game message type {} from slot {} ({} bytes)",
                        msg.raw_type(),
                        msg.source,
                        msg.body.len()
                    );
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    host.shutdown().await;
    Ok(())
}
