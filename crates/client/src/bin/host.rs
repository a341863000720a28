//! Partyline host - creates a room and runs games for it.
//!
//! Operator commands are read from stdin, one per line.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use partyline_client::coordinator::{CoordinatorConfig, HostHandle, HostNotice, SessionCoordinator};
use partyline_client::dispatcher::RequestDispatcher;
use partyline_client::modules::{LobbyModule, ModuleRegistry, PollModule};
use partyline_client::{
    init_tracing, load_dotenv_from_repo_root, spawn_audio, spawn_relay, ClientSettings,
};
use partyline_domain::GameName;

const HELP: &str = "commands: game <name>, unload, purge <index>, players, quit";
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();
    init_tracing();

    let settings = ClientSettings::from_env()?;
    tracing::info!(relay = %settings.relay_url, room = ?settings.room, "Starting Partyline host");

    let audio = spawn_audio(&settings)?;
    let shutdown = CancellationToken::new();
    let (outbox, events, transport) = spawn_relay(&settings, shutdown.clone());

    let lobby = GameName::new("lobby")?;
    let poll = GameName::new("poll")?;
    let registry = ModuleRegistry::new()
        .with(lobby.clone(), move |ctx| LobbyModule::new(lobby.clone(), ctx))
        .with(poll.clone(), move |ctx| PollModule::new(poll.clone(), ctx));
    println!("games: {}", join_names(&registry.names()));

    let config = CoordinatorConfig::new(registry).with_room(settings.room.clone());
    let (host, notices, coordinator) = SessionCoordinator::spawn(config, outbox, events, audio);
    tokio::spawn(show_notices(notices));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !run_command(&host, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    host.shutdown();
    coordinator.await?;
    // The coordinator's outbox is gone; give the transport a moment to
    // deliver the leave frame.
    if tokio::time::timeout(FLUSH_TIMEOUT, transport).await.is_err() {
        shutdown.cancel();
    }
    Ok(())
}

/// Returns `false` when the operator asked to quit.
async fn run_command(host: &HostHandle, line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (None, _) => {}
        (Some("quit" | "exit"), _) => return false,
        (Some("game"), Some(name)) => match GameName::new(name) {
            Ok(name) => {
                host.request_game(name);
            }
            Err(e) => println!("{}", e),
        },
        (Some("unload"), _) => {
            host.unload();
        }
        (Some("purge"), Some(index)) => match index.parse::<usize>() {
            Ok(index) => match host.purge(index).await {
                Some(player) => println!("purged {}", player.name()),
                None => println!("no player at {}", index),
            },
            Err(_) => println!("purge takes a player index"),
        },
        (Some("players"), _) => match host.snapshot().await {
            Some(snapshot) => {
                let room = snapshot
                    .room
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "-".into());
                let game = snapshot
                    .active_game
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "room {} | game {} | phase {} | {} awaiting answers",
                    room,
                    game,
                    snapshot.phase.as_deref().unwrap_or("-"),
                    snapshot.outstanding
                );
                for (index, player) in snapshot.players.iter().enumerate() {
                    let state = serde_json::Value::Object(player.state().clone());
                    println!("  {} {} {}", index, player.name(), state);
                }
            }
            None => println!("session is gone"),
        },
        _ => println!("{}", HELP),
    }
    true
}

/// Print operator notices, rendering module output the way a player screen
/// would.
async fn show_notices(mut notices: mpsc::UnboundedReceiver<HostNotice>) {
    let (mut display, mut clears) = RequestDispatcher::new();
    loop {
        tokio::select! {
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                match notice {
                    HostNotice::RoomReady(code) => println!("room {} is open", code),
                    HostNotice::PlayerJoined(player) => println!("+ {}", player.name()),
                    HostNotice::PlayerLeft(player) => println!("- {}", player.name()),
                    HostNotice::ModuleActivated(name) => println!("game {} started", name),
                    HostNotice::ModuleFailed { name, error } => {
                        println!("game {} failed: {}", name, error)
                    }
                    HostNotice::ModuleUnloaded(name) => println!("game {} ended", name),
                    HostNotice::Display(request) => {
                        if display.dispatch(&request) {
                            println!("[screen] {}", display.screen().render());
                        }
                    }
                    HostNotice::ClearScreen => display.clear(),
                    HostNotice::RelayError { code, message } => {
                        println!("relay error {:?}: {}", code, message)
                    }
                    HostNotice::ConnectionLost => println!("connection lost, reconnecting"),
                }
            }
            Some(timer) = clears.recv() => display.on_clear(timer),
        }
    }
}

fn join_names(names: &[GameName]) -> String {
    names
        .iter()
        .map(GameName::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
