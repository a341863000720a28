//! Partyline player - joins a room and answers the host from the terminal.
//!
//! Type an option id to pick it from the current selection.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use partyline_client::modules::{ModuleRegistry, ScreenModule};
use partyline_client::player::{PlayerClient, PlayerConfig, PlayerHandle};
use partyline_client::{
    init_tracing, load_dotenv_from_repo_root, spawn_audio, spawn_relay, ClientSettings,
};
use partyline_domain::{GameName, PlayerProfile};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();
    init_tracing();

    let settings = ClientSettings::from_env()?;
    let Some(room) = settings.room.clone() else {
        anyhow::bail!("PARTYLINE_ROOM must name the room to join");
    };
    tracing::info!(relay = %settings.relay_url, room = %room, name = %settings.name, "Starting Partyline player");

    let audio = spawn_audio(&settings)?;
    let shutdown = CancellationToken::new();
    let (outbox, events, transport) = spawn_relay(&settings, shutdown.clone());

    let mut registry = ModuleRegistry::new();
    for name in ["lobby", "poll"] {
        let name = GameName::new(name)?;
        let module_name = name.clone();
        registry.register_with(name, move |ctx| ScreenModule::new(module_name.clone(), ctx));
    }

    let mut profile = PlayerProfile::new(settings.name.clone());
    if let Some(avatar) = &settings.avatar {
        profile = profile.with_avatar(avatar.clone());
    }
    let config = PlayerConfig::new(room, profile, registry);
    let (player, client) = PlayerClient::spawn(config, outbox, events, audio);
    tokio::spawn(show_screen(player.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    "" => {}
                    "quit" | "exit" => break,
                    option => {
                        if let Err(e) = player.select(option).await {
                            println!("{}", e);
                        }
                    }
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    player.shutdown();
    client.await?;
    if tokio::time::timeout(FLUSH_TIMEOUT, transport).await.is_err() {
        shutdown.cancel();
    }
    Ok(())
}

/// Print the screen whenever it changes, plus host presence and game.
async fn show_screen(player: PlayerHandle) {
    let mut screen = player.screen();
    let mut view = player.view();
    let (mut host_present, mut game) = {
        let current = view.borrow_and_update();
        (current.host_present, current.game.clone())
    };

    loop {
        tokio::select! {
            changed = screen.changed() => {
                if changed.is_err() {
                    break;
                }
                let rendered = screen.borrow_and_update().render();
                println!("----\n{}", rendered);
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                if current.host_present != host_present {
                    host_present = current.host_present;
                    println!("{}", if host_present { "host is here" } else { "waiting for the host" });
                }
                if current.game != game {
                    game = current.game;
                    match &game {
                        Some(name) => println!("now playing {}", name),
                        None => println!("no game running"),
                    }
                }
            }
        }
    }
}
