//! Player Client: the session actor running on a player device.
//!
//! Joins a room, announces itself to the host with a resume credential and
//! keeps a read-only projection of the roster. Only the host is trusted:
//! messages from anyone else are dropped. Requests go through the
//! [`RequestDispatcher`]; the active module only owns local audio.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use partyline_domain::{ConnectionId, GameName, Player, PlayerProfile, Role, RoomCode};
use partyline_shared::{ClientFrame, ErrorCode, GameMessage, PeerInfo, RelayFrame, Target};

use crate::audio::AudioSequencer;
use crate::dispatcher::{ClearTimer, RequestDispatcher, Screen, SelectError};
use crate::modules::{
    LoaderEvent, LoaderOutcome, LogStylesheets, ModuleCommand, ModuleContext, ModuleLoader,
    ModuleMessage, ModuleRegistry, StylesheetHost,
};
use crate::relay::{Outbox, RelayEvent};

/// Delay before trying a room the relay did not know about again.
const JOIN_RETRY_DELAY: Duration = Duration::from_secs(2);

// =============================================================================
// Public surface
// =============================================================================

/// The player's view of the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerView {
    pub room: Option<RoomCode>,
    pub connection_id: Option<ConnectionId>,
    pub connected: bool,
    pub host_present: bool,
    /// Roster as last reported by the host, in join order.
    pub players: Vec<Player>,
    pub game: Option<GameName>,
}

impl PlayerView {
    /// This device's own entry, once the host has announced it.
    pub fn me(&self) -> Option<&Player> {
        let id = self.connection_id?;
        self.players.iter().find(|p| p.connection_id() == id)
    }
}

enum PlayerCommand {
    Select(String, oneshot::Sender<Result<(), SelectError>>),
    Snapshot(oneshot::Sender<PlayerView>),
    Shutdown,
}

#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    screen: watch::Receiver<Screen>,
    view: watch::Receiver<PlayerView>,
}

impl PlayerHandle {
    /// Pick an option of the on-screen selection and answer the host.
    pub async fn select(&self, option_id: impl Into<String>) -> Result<(), SelectError> {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(PlayerCommand::Select(option_id.into(), tx))
            .is_err()
        {
            return Err(SelectError::NoActiveSelection);
        }
        rx.await.unwrap_or(Err(SelectError::NoActiveSelection))
    }

    /// Current view, after everything queued before the call was handled.
    pub async fn snapshot(&self) -> Option<PlayerView> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(PlayerCommand::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    pub fn screen(&self) -> watch::Receiver<Screen> {
        self.screen.clone()
    }

    pub fn view(&self) -> watch::Receiver<PlayerView> {
        self.view.clone()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(PlayerCommand::Shutdown).is_ok()
    }
}

pub struct PlayerConfig {
    pub room: RoomCode,
    pub profile: PlayerProfile,
    pub registry: ModuleRegistry,
    pub stylesheets: Arc<dyn StylesheetHost>,
}

impl PlayerConfig {
    /// A credential is minted when the profile carries none, so the host
    /// can reunite this device with its state after a reconnect.
    pub fn new(room: RoomCode, profile: PlayerProfile, registry: ModuleRegistry) -> Self {
        let profile = match profile.credential {
            Some(_) => profile,
            None => profile.with_credential(uuid::Uuid::new_v4().to_string()),
        };
        Self {
            room,
            profile,
            registry,
            stylesheets: Arc::new(LogStylesheets),
        }
    }

    pub fn with_stylesheets(mut self, stylesheets: Arc<dyn StylesheetHost>) -> Self {
        self.stylesheets = stylesheets;
        self
    }
}

// =============================================================================
// Actor
// =============================================================================

struct Inboxes {
    relay: mpsc::UnboundedReceiver<RelayEvent>,
    loader: mpsc::UnboundedReceiver<LoaderEvent>,
    modules: mpsc::UnboundedReceiver<ModuleMessage>,
    clears: mpsc::UnboundedReceiver<ClearTimer>,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    retry: mpsc::UnboundedReceiver<()>,
}

pub struct PlayerClient {
    room: RoomCode,
    profile: PlayerProfile,
    host_id: Option<ConnectionId>,
    in_room: bool,
    outbox: Outbox,
    audio: AudioSequencer,
    loader: ModuleLoader,
    dispatcher: RequestDispatcher,
    view: watch::Sender<PlayerView>,
    retry: mpsc::UnboundedSender<()>,
}

impl PlayerClient {
    pub fn spawn(
        config: PlayerConfig,
        outbox: Outbox,
        relay_events: mpsc::UnboundedReceiver<RelayEvent>,
        audio: AudioSequencer,
    ) -> (PlayerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (module_tx, module_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let template = ModuleContext::new(Role::Player, audio.clone(), module_tx);
        let (loader, loader_rx) = ModuleLoader::new(config.registry, template, config.stylesheets);
        let (dispatcher, clears_rx) = RequestDispatcher::new();
        let (view, view_rx) = watch::channel(PlayerView {
            room: Some(config.room.clone()),
            ..PlayerView::default()
        });

        let handle = PlayerHandle {
            tx: command_tx,
            screen: dispatcher.subscribe(),
            view: view_rx,
        };
        let client = Self {
            room: config.room,
            profile: config.profile,
            host_id: None,
            in_room: false,
            outbox,
            audio,
            loader,
            dispatcher,
            view,
            retry: retry_tx,
        };
        let inboxes = Inboxes {
            relay: relay_events,
            loader: loader_rx,
            modules: module_rx,
            clears: clears_rx,
            commands: command_rx,
            retry: retry_rx,
        };

        (handle, tokio::spawn(client.run(inboxes)))
    }

    async fn run(mut self, mut inboxes: Inboxes) {
        loop {
            tokio::select! {
                biased;
                Some(message) = inboxes.modules.recv() => self.on_module(message).await,
                Some(event) = inboxes.loader.recv() => self.on_loader(event).await,
                event = inboxes.relay.recv() => match event {
                    Some(event) => self.on_relay(event).await,
                    None => {
                        tracing::info!("Relay transport closed");
                        break;
                    }
                },
                Some(timer) = inboxes.clears.recv() => self.dispatcher.on_clear(timer),
                command = inboxes.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(()) = inboxes.retry.recv() => self.retry_join(),
            }
        }

        self.loader.shutdown().await;
        self.audio.stop_all();
        self.dispatcher.clear();
        if self.in_room {
            self.outbox.frame(ClientFrame::LeaveRoom);
        }
        tracing::info!("Player client stopped");
    }

    fn update_view(&self, change: impl FnOnce(&mut PlayerView)) {
        self.view.send_modify(change);
    }

    // =========================================================================
    // Relay
    // =========================================================================

    async fn on_relay(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected => {
                self.in_room = false;
                self.update_view(|view| view.connected = true);
                self.join_room();
            }
            RelayEvent::Disconnected => {
                self.in_room = false;
                self.host_id = None;
                tracing::warn!(room = %self.room, "Lost relay connection");
                self.update_view(|view| {
                    view.connected = false;
                    view.host_present = false;
                });
            }
            RelayEvent::Frame(frame) => self.on_frame(frame).await,
        }
    }

    fn join_room(&self) {
        tracing::debug!(room = %self.room, "Joining room");
        self.outbox.frame(ClientFrame::JoinRoom {
            room: self.room.clone(),
            role: Role::Player,
        });
    }

    fn retry_join(&self) {
        if !self.in_room && self.view.borrow().connected {
            self.join_room();
        }
    }

    /// `client:join` to the host. Repeats are harmless: the host treats an
    /// unchanged profile as a no-op.
    fn announce(&self) {
        tracing::debug!(name = %self.profile.name, "Announcing to host");
        self.outbox.to_host(&GameMessage::Join(self.profile.clone()));
    }

    async fn on_frame(&mut self, frame: RelayFrame) {
        match frame {
            RelayFrame::RoomJoined {
                room,
                connection_id,
                role,
                peers,
            } => self.on_room_joined(room, connection_id, role, peers),
            RelayFrame::Connect {
                connection_id,
                role: Role::Host,
            } => {
                tracing::info!(host = %connection_id, "Host connected");
                self.host_id = Some(connection_id);
                self.update_view(|view| view.host_present = true);
                self.announce();
            }
            RelayFrame::Connect { connection_id, .. } => {
                tracing::trace!(connection_id = %connection_id, "Peer connected");
            }
            RelayFrame::Disconnect { connection_id } if Some(connection_id) == self.host_id => {
                tracing::warn!(host = %connection_id, "Host left the room");
                self.host_id = None;
                self.update_view(|view| view.host_present = false);
            }
            RelayFrame::Disconnect { .. } => {}
            RelayFrame::Message { from, message } => {
                if Some(from) != self.host_id {
                    tracing::debug!(from = %from, "Message from a non-host connection dropped");
                    return;
                }
                match GameMessage::from_value(message) {
                    Ok(message) => self.on_message(message).await,
                    Err(e) => tracing::warn!(error = %e, "Undecodable game message dropped"),
                }
            }
            RelayFrame::Error { code, message } => {
                tracing::warn!(?code, message = %message, "Relay error");
                if code == ErrorCode::RoomNotFound && !self.in_room {
                    self.schedule_join_retry();
                }
            }
            RelayFrame::Pong => {}
        }
    }

    fn schedule_join_retry(&self) {
        let retry = self.retry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(JOIN_RETRY_DELAY).await;
            let _ = retry.send(());
        });
    }

    fn on_room_joined(
        &mut self,
        room: RoomCode,
        connection_id: ConnectionId,
        role: Role,
        peers: Vec<PeerInfo>,
    ) {
        if role != Role::Player {
            tracing::warn!(room = %room, role = %role, "Joined room without the player role");
            return;
        }
        self.in_room = true;
        self.host_id = peers
            .iter()
            .find(|peer| peer.role == Role::Host)
            .map(|peer| peer.connection_id);

        tracing::info!(room = %room, connection_id = %connection_id, host = ?self.host_id, "Joined room");
        let host_present = self.host_id.is_some();
        self.update_view(|view| {
            view.room = Some(room);
            view.connection_id = Some(connection_id);
            view.host_present = host_present;
        });
        if host_present {
            self.announce();
        }
    }

    async fn on_message(&mut self, message: GameMessage) {
        match message {
            GameMessage::PlayersInRoom(players) => {
                tracing::debug!(players = players.len(), "Roster snapshot");
                self.update_view(|view| view.players = players);
            }
            GameMessage::AddPlayer(player) => self.update_view(|view| {
                match view
                    .players
                    .iter_mut()
                    .find(|p| p.connection_id() == player.connection_id())
                {
                    Some(existing) => *existing = player,
                    None => view.players.push(player),
                }
            }),
            GameMessage::PlayerDisconnect(id) => {
                self.update_view(|view| view.players.retain(|p| p.connection_id() != id));
            }
            GameMessage::LoadGame(name) => self.load_game(name),
            GameMessage::Request(request) => {
                self.dispatcher.dispatch(&request);
            }
            GameMessage::AudioPlay(cue) => self.audio.play_cue(&cue),
            other => {
                tracing::debug!(event = other.event_name(), "Unexpected message from host dropped");
            }
        }
    }

    fn load_game(&mut self, name: GameName) {
        // The host repeats `server:loadgame` when it catches us up.
        if self.loader.is_settled() && self.loader.active() == Some(&name) {
            tracing::trace!(game = %name, "Game already active");
            return;
        }
        tracing::info!(game = %name, "Loading game");
        let players = self.view.borrow().players.clone();
        self.loader.load(name, &players);
    }

    // =========================================================================
    // Local commands
    // =========================================================================

    fn on_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Select(option_id, reply) => {
                let result = self.dispatcher.select(&option_id).map(|response| {
                    tracing::debug!(request_id = %response.request_id, option = %option_id, "Answer sent");
                    self.outbox.to_host(&GameMessage::Response(response));
                });
                let _ = reply.send(result);
            }
            PlayerCommand::Snapshot(reply) => {
                let _ = reply.send(self.view.borrow().clone());
            }
            PlayerCommand::Shutdown => {}
        }
    }

    // =========================================================================
    // Modules
    // =========================================================================

    async fn on_module(&mut self, message: ModuleMessage) {
        if !self.loader.admits(&message) {
            tracing::debug!(generation = message.generation, command = ?message.command, "Command from a replaced module dropped");
            return;
        }
        let generation = message.generation;
        match message.command {
            ModuleCommand::Send {
                to: Target::Host,
                message,
            } => {
                self.outbox.to_host(&message);
            }
            ModuleCommand::Display(request) => {
                self.dispatcher.dispatch(&request);
            }
            ModuleCommand::ClearScreen => self.dispatcher.clear(),
            ModuleCommand::Timer(tag) => self.loader.timer(generation, tag).await,
            other => {
                tracing::debug!(command = ?other, "Host-only module command ignored");
            }
        }
    }

    async fn on_loader(&mut self, event: LoaderEvent) {
        let players = self.view.borrow().players.clone();
        for outcome in self.loader.on_event(event, &players).await {
            match outcome {
                LoaderOutcome::Activated(name) => {
                    self.update_view(|view| view.game = Some(name));
                }
                LoaderOutcome::Failed { name, error } => {
                    tracing::warn!(game = %name, error = %error, "Game module failed");
                    self.update_view(|view| view.game = None);
                }
                LoaderOutcome::Unloaded(name) => {
                    tracing::debug!(game = %name, "Game module unloaded");
                    self.update_view(|view| view.game = None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
