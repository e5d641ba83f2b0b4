use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

use client::{ClientSession, JoinSettings};
use shared::NetEvent;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to join, e.g. 203.0.113.7:2100
    #[arg(short = 's', long)]
    host: Option<String>,

    /// Lobby server to query for open sessions
    #[arg(short = 'l', long)]
    lobby: Option<String>,

    /// Player name
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Session password, if the host requires one
    #[arg(long, default_value = "")]
    password: String,

    /// Mod list; must match the host's exactly
    #[arg(long, default_value = "")]
    mods: String,

    /// Directory where transferred files are stored
    #[arg(short = 'd', long)]
    download_dir: Option<PathBuf>,

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

    // With only a lobby given, print the listing and stop.
    if args.host.is_none() {
        let Some(lobby) = &args.lobby else {
            eprintln!("Either --host or --lobby is required");
            std::process::exit(2);
        };
        match client::lobby::list_games(lobby).await {
            Ok(games) if games.is_empty() => println!("No games listed."),
            Ok(games) => {
                for game in games {
                    println!(
                        "{:<24} {:<20} {}/{} players{}",
                        game.name,
                        game.host,
                        game.current_players,
                        game.max_players,
                        if game.password_required { "  [password]" } else { "" }
                    );
                }
            }
            Err(e) => {
                warn!("lobby unavailable: {}", e);
                println!("No games listed.");
            }
        }
        return Ok(());
    }

    let host_addr = args.host.as_deref().unwrap_or_default();
    let mut settings = JoinSettings::new(&args.name);
    settings.password = args.password.clone();
    settings.mods = args.mods.clone();
    if let Some(dir) = &args.download_dir {
        settings.download_dir = dir.clone();
    }

    let mut session = ClientSession::join(host_addr, settings).await?;
    info!("joined as slot {}", session.slot());

    let mut ticker = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.update().await;

                for event in session.take_events() {
                    match &event {
                        NetEvent::HostDropped => {
                            warn!("lost the host; leaving");
                            return Ok(());
                        }
                        NetEvent::PlayerKicked { slot } if *slot == session.slot() => {
                            warn!("kicked from the session");
                            return Ok(());
                        }
                        other => info!("{:?}", other),
                    }
                }

                while let Some(msg) = session.recv() {
                    info!(
                        "game message type {} from slot {} ({} bytes)",
                        msg.raw_type(),
                        msg.source,
                        msg.body.len()
                    );
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("leaving session");
                session.leave().await;
                return Ok(());
            }
        }
    }
}
