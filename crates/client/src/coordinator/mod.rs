//! Session Coordinator: the host's authoritative session actor.
//!
//! Owns the [`Room`], the module loader and the outstanding requests. Relay
//! events, operator commands, module commands and loader completions all
//! arrive on inboxes of one task, so session state has a single writer.
//! Other code talks to it through a [`HostHandle`] and watches
//! [`HostNotice`]s.

mod requests;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use partyline_domain::{
    ConnectionId, GameName, JoinOutcome, Player, PlayerProfile, Role, Room, RoomCode,
};
use partyline_shared::{
    ClientFrame, ErrorCode, GameMessage, PeerInfo, RelayFrame, Request, Response, Target,
};

use crate::audio::AudioSequencer;
use crate::modules::{
    LoaderEvent, LoaderOutcome, LoaderPhase, LogStylesheets, ModuleCommand, ModuleContext,
    ModuleEvent, ModuleLoader, ModuleMessage, ModuleRegistry, RequestTarget, StylesheetHost,
};
use crate::relay::{Outbox, RelayEvent};

pub use requests::OutstandingRequests;

/// Delay before asking for the room again while the relay still holds our
/// previous host connection.
const CREATE_RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Public surface
// =============================================================================

/// What the host operator should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum HostNotice {
    RoomReady(RoomCode),
    PlayerJoined(Player),
    PlayerLeft(Player),
    ModuleActivated(GameName),
    ModuleFailed { name: GameName, error: String },
    ModuleUnloaded(GameName),
    /// Show a request on the host display.
    Display(Request),
    ClearScreen,
    RelayError { code: ErrorCode, message: String },
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSnapshot {
    pub room: Option<RoomCode>,
    pub players: Vec<Player>,
    pub active_game: Option<GameName>,
    pub phase: Option<String>,
    pub loader: LoaderPhase,
    pub outstanding: usize,
}

enum HostCommand {
    RequestGame(GameName),
    Unload,
    Purge(usize, oneshot::Sender<Option<Player>>),
    Snapshot(oneshot::Sender<CoordinatorSnapshot>),
    Shutdown,
}

/// Cloneable handle to a running coordinator.
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl HostHandle {
    fn send(&self, command: HostCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// `host:requestgame`: end the active module and load `name`.
    pub fn request_game(&self, name: GameName) -> bool {
        self.send(HostCommand::RequestGame(name))
    }

    pub fn unload(&self) -> bool {
        self.send(HostCommand::Unload)
    }

    /// Remove the player at `index` (join order) and forget its credential.
    pub async fn purge(&self, index: usize) -> Option<Player> {
        let (tx, rx) = oneshot::channel();
        if !self.send(HostCommand::Purge(index, tx)) {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn snapshot(&self) -> Option<CoordinatorSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(HostCommand::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(HostCommand::Shutdown)
    }
}

pub struct CoordinatorConfig {
    /// Room to create or reclaim; the relay picks one when unset.
    pub room: Option<RoomCode>,
    pub registry: ModuleRegistry,
    pub stylesheets: Arc<dyn StylesheetHost>,
}

impl CoordinatorConfig {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            room: None,
            registry,
            stylesheets: Arc::new(LogStylesheets),
        }
    }

    pub fn with_room(mut self, room: Option<RoomCode>) -> Self {
        self.room = room;
        self
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
    host: mpsc::UnboundedReceiver<HostCommand>,
    retry: mpsc::UnboundedReceiver<()>,
}

pub struct SessionCoordinator {
    preferred_room: Option<RoomCode>,
    room: Option<Room>,
    connection_id: Option<ConnectionId>,
    joined: bool,
    outbox: Outbox,
    audio: AudioSequencer,
    loader: ModuleLoader,
    outstanding: OutstandingRequests,
    notices: mpsc::UnboundedSender<HostNotice>,
    retry: mpsc::UnboundedSender<()>,
}

impl SessionCoordinator {
    /// Start the coordinator. It runs until `HostHandle::shutdown`, until
    /// every handle is dropped or until the relay transport goes away.
    pub fn spawn(
        config: CoordinatorConfig,
        outbox: Outbox,
        relay_events: mpsc::UnboundedReceiver<RelayEvent>,
        audio: AudioSequencer,
    ) -> (HostHandle, mpsc::UnboundedReceiver<HostNotice>, JoinHandle<()>) {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (module_tx, module_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let template = ModuleContext::new(Role::Host, audio.clone(), module_tx);
        let (loader, loader_rx) = ModuleLoader::new(config.registry, template, config.stylesheets);

        let coordinator = Self {
            preferred_room: config.room,
            room: None,
            connection_id: None,
            joined: false,
            outbox,
            audio,
            loader,
            outstanding: OutstandingRequests::new(),
            notices: notice_tx,
            retry: retry_tx,
        };
        let inboxes = Inboxes {
            relay: relay_events,
            loader: loader_rx,
            modules: module_rx,
            host: host_rx,
            retry: retry_rx,
        };

        let task = tokio::spawn(coordinator.run(inboxes));
        (HostHandle { tx: host_tx }, notice_rx, task)
    }

    async fn run(mut self, mut inboxes: Inboxes) {
        loop {
            // Module commands first so their effects land before the next
            // relay event; operator commands last so a snapshot observes
            // everything queued before it.
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
                command = inboxes.host.recv() => match command {
                    Some(HostCommand::Shutdown) | None => break,
                    Some(command) => self.on_host(command).await,
                },
                Some(()) = inboxes.retry.recv() => self.retry_create(),
            }
        }

        self.loader.shutdown().await;
        self.audio.stop_all();
        if self.joined {
            self.outbox.frame(ClientFrame::LeaveRoom);
        }
        tracing::info!("Session coordinator stopped");
    }

    fn notify(&self, notice: HostNotice) {
        let _ = self.notices.send(notice);
    }

    fn players(&self) -> &[Player] {
        self.room.as_ref().map(Room::players).unwrap_or(&[])
    }

    // =========================================================================
    // Relay
    // =========================================================================

    async fn on_relay(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected => {
                self.joined = false;
                self.connection_id = None;
                self.create_room();
            }
            RelayEvent::Disconnected => {
                self.joined = false;
                tracing::warn!("Lost relay connection, players will be reconciled on reconnect");
                self.notify(HostNotice::ConnectionLost);
            }
            RelayEvent::Frame(frame) => self.on_frame(frame).await,
        }
    }

    fn room_code_to_claim(&self) -> Option<RoomCode> {
        self.room
            .as_ref()
            .map(|room| room.code().clone())
            .or_else(|| self.preferred_room.clone())
    }

    fn create_room(&self) {
        let code = self.room_code_to_claim();
        tracing::debug!(room = ?code, "Requesting room");
        self.outbox.frame(ClientFrame::CreateRoom { code });
    }

    fn retry_create(&self) {
        if !self.joined {
            self.create_room();
        }
    }

    async fn on_frame(&mut self, frame: RelayFrame) {
        match frame {
            RelayFrame::RoomJoined {
                room,
                connection_id,
                role,
                peers,
            } => self.on_room_joined(room, connection_id, role, peers).await,
            RelayFrame::Connect {
                connection_id,
                role: Role::Player,
            } => self.catch_up(connection_id),
            RelayFrame::Connect { connection_id, .. } => {
                tracing::warn!(connection_id = %connection_id, "Second host connection reported");
            }
            RelayFrame::Disconnect { connection_id } => {
                if self.remove_player(connection_id, false).await.is_none() {
                    tracing::debug!(connection_id = %connection_id, "Connection left before joining");
                }
            }
            RelayFrame::Message { from, message } => match GameMessage::from_value(message) {
                Ok(message) => self.on_message(from, message).await,
                Err(e) => tracing::warn!(from = %from, error = %e, "Undecodable game message dropped"),
            },
            RelayFrame::Error { code, message } => {
                tracing::warn!(?code, message = %message, "Relay error");
                if code == ErrorCode::HostAlreadyConnected && !self.joined {
                    self.schedule_create_retry();
                }
                self.notify(HostNotice::RelayError { code, message });
            }
            RelayFrame::Pong => {}
        }
    }

    fn schedule_create_retry(&self) {
        let retry = self.retry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CREATE_RETRY_DELAY).await;
            let _ = retry.send(());
        });
    }

    async fn on_room_joined(
        &mut self,
        code: RoomCode,
        connection_id: ConnectionId,
        role: Role,
        peers: Vec<PeerInfo>,
    ) {
        if role != Role::Host {
            tracing::warn!(room = %code, role = %role, "Joined room without the host role");
            return;
        }
        self.connection_id = Some(connection_id);
        self.joined = true;

        let room = match self.room.take() {
            Some(mut room) => {
                if room.code() != &code {
                    tracing::warn!(old = %room.code(), new = %code, "Relay assigned a different room");
                    room.rename(code.clone());
                }
                room
            }
            None => Room::new(code.clone()),
        };
        self.room = Some(room);

        // Players who left while we were offline.
        let live: HashSet<ConnectionId> = peers
            .iter()
            .filter(|peer| peer.role == Role::Player)
            .map(|peer| peer.connection_id)
            .collect();
        let gone: Vec<ConnectionId> = self
            .players()
            .iter()
            .map(Player::connection_id)
            .filter(|id| !live.contains(id))
            .collect();
        for id in gone {
            self.remove_player(id, false).await;
        }

        if let Some(room) = &self.room {
            if !room.is_empty() {
                self.outbox
                    .to_players(&GameMessage::PlayersInRoom(room.snapshot()));
            }
            if let Some(game) = room.active_game() {
                self.outbox.to_players(&GameMessage::LoadGame(game.clone()));
            }
        }

        tracing::info!(room = %code, connection_id = %connection_id, peers = peers.len(), "Room ready");
        self.notify(HostNotice::RoomReady(code));
    }

    /// Bring a newly connected client up to date.
    fn catch_up(&self, connection_id: ConnectionId) {
        let Some(room) = &self.room else {
            return;
        };
        tracing::debug!(connection_id = %connection_id, players = room.len(), "Player connected");
        if !room.is_empty() {
            self.outbox.send(
                Target::Connection(connection_id),
                &GameMessage::PlayersInRoom(room.snapshot()),
            );
        }
        if let Some(game) = room.active_game() {
            self.outbox.send(
                Target::Connection(connection_id),
                &GameMessage::LoadGame(game.clone()),
            );
        }
    }

    async fn on_message(&mut self, from: ConnectionId, message: GameMessage) {
        match message {
            GameMessage::Join(profile) => self.on_join(from, profile).await,
            GameMessage::Response(response) => self.on_response(from, response).await,
            other => {
                tracing::debug!(from = %from, event = other.event_name(), "Unexpected message from player dropped");
            }
        }
    }

    // =========================================================================
    // Membership
    // =========================================================================

    async fn on_join(&mut self, from: ConnectionId, profile: PlayerProfile) {
        let Some(room) = self.room.as_mut() else {
            tracing::debug!(from = %from, "Join before room is ready dropped");
            return;
        };

        match room.join(from, profile) {
            JoinOutcome::Added(player) => {
                tracing::info!(player = %player.name(), connection_id = %from, "Player joined");
                self.announce_player(&player);
                self.notify(HostNotice::PlayerJoined(player.clone()));
                self.loader.dispatch(ModuleEvent::PlayerJoined(player)).await;
            }
            JoinOutcome::Rejoined { player, replaced } => {
                tracing::info!(player = %player.name(), connection_id = %from, replaced = ?replaced, "Player rejoined");
                if let Some(old) = replaced {
                    self.outstanding.forget(old);
                    self.outbox
                        .send(Target::PlayersExcept(from), &GameMessage::PlayerDisconnect(old));
                    self.loader.dispatch(ModuleEvent::PlayerLeft(old)).await;
                }
                self.announce_player(&player);
                self.notify(HostNotice::PlayerJoined(player.clone()));
                self.loader.dispatch(ModuleEvent::PlayerJoined(player)).await;
            }
            JoinOutcome::Updated(player) => {
                tracing::debug!(player = %player.name(), connection_id = %from, "Player profile updated");
                self.announce_player(&player);
            }
            JoinOutcome::Unchanged => {
                tracing::trace!(connection_id = %from, "Repeated join ignored");
            }
        }
    }

    /// Incremental `addplayer` to everyone else, then the player's own entry
    /// straight to it so its projection includes itself.
    fn announce_player(&self, player: &Player) {
        let id = player.connection_id();
        let message = GameMessage::AddPlayer(player.clone());
        self.outbox.send(Target::PlayersExcept(id), &message);
        self.outbox.send(Target::Connection(id), &message);
    }

    async fn remove_player(&mut self, id: ConnectionId, purge: bool) -> Option<Player> {
        let room = self.room.as_mut()?;
        let player = if purge { room.purge(id) } else { room.remove(id) }?;

        tracing::info!(player = %player.name(), connection_id = %id, purge, "Player removed");
        self.outstanding.forget(id);
        self.outbox.to_players(&GameMessage::PlayerDisconnect(id));
        self.loader.dispatch(ModuleEvent::PlayerLeft(id)).await;
        self.notify(HostNotice::PlayerLeft(player.clone()));
        Some(player)
    }

    async fn on_response(&mut self, from: ConnectionId, response: Response) {
        if !self.room.as_ref().is_some_and(|room| room.contains(from)) {
            tracing::debug!(from = %from, request_id = %response.request_id, "Response from unknown connection dropped");
            return;
        }
        let Some(generation) = self.outstanding.accept(from, response.request_id) else {
            tracing::debug!(from = %from, request_id = %response.request_id, "Response to a request that is not outstanding dropped");
            return;
        };
        if self.loader.live_generation() != Some(generation) {
            tracing::debug!(from = %from, request_id = %response.request_id, generation, "Response for a replaced module dropped");
            return;
        }
        self.loader
            .dispatch(ModuleEvent::Response {
                from,
                request_id: response.request_id,
                value: response.value,
            })
            .await;
    }

    // =========================================================================
    // Operator
    // =========================================================================

    async fn on_host(&mut self, command: HostCommand) {
        match command {
            HostCommand::RequestGame(name) => {
                tracing::info!(game = %name, "Game requested");
                // Each game starts from empty state bags; a repeat request
                // for the game already loading keeps what its start wrote.
                if self.loader.phase() != LoaderPhase::Loading(name.clone()) {
                    if let Some(room) = self.room.as_mut() {
                        room.reset_player_state();
                    }
                }
                let players = self.players().to_vec();
                self.loader.load(name, &players);
            }
            HostCommand::Unload => self.loader.unload(),
            HostCommand::Purge(index, reply) => {
                let id = self
                    .room
                    .as_ref()
                    .and_then(|room| room.player_at(index))
                    .map(Player::connection_id);
                let purged = match id {
                    Some(id) => self.remove_player(id, true).await,
                    None => None,
                };
                let _ = reply.send(purged);
            }
            HostCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            HostCommand::Shutdown => {}
        }
    }

    fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            room: self.room.as_ref().map(|room| room.code().clone()),
            players: self.players().to_vec(),
            active_game: self.room.as_ref().and_then(|room| room.active_game().cloned()),
            phase: self
                .room
                .as_ref()
                .and_then(|room| room.phase().map(str::to_string)),
            loader: self.loader.phase(),
            outstanding: self.outstanding.len(),
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
            ModuleCommand::Request { to, request } => self.send_request(generation, to, request),
            ModuleCommand::Send { to, message } => {
                self.outbox.send(to, &message);
            }
            ModuleCommand::UpdatePlayer { player, key, value } => {
                let Some(entry) = self.room.as_mut().and_then(|room| room.player_mut(player)) else {
                    tracing::debug!(player = %player, "State update for departed player dropped");
                    return;
                };
                entry.set_state(key, value);
                let updated = entry.clone();
                self.outbox.to_players(&GameMessage::AddPlayer(updated));
            }
            ModuleCommand::SetPhase(phase) => {
                if let Some(room) = self.room.as_mut() {
                    room.set_phase(phase);
                }
            }
            ModuleCommand::Display(request) => self.notify(HostNotice::Display(request)),
            ModuleCommand::ClearScreen => self.notify(HostNotice::ClearScreen),
            ModuleCommand::Timer(tag) => self.loader.timer(generation, tag).await,
        }
    }

    fn send_request(&mut self, generation: u64, to: RequestTarget, request: Request) {
        let Some(room) = &self.room else {
            tracing::debug!(request_id = %request.id, "Request before room is ready dropped");
            return;
        };
        let (target, recipients) = match to {
            RequestTarget::AllPlayers => (
                Target::Players,
                room.players().iter().map(Player::connection_id).collect(),
            ),
            RequestTarget::Player(id) if room.contains(id) => (Target::Connection(id), vec![id]),
            RequestTarget::Player(id) => {
                tracing::debug!(player = %id, request_id = %request.id, "Request for departed player dropped");
                return;
            }
        };

        for id in recipients {
            if request.expects_response() {
                self.outstanding.issue(id, request.id, generation);
            } else {
                self.outstanding.supersede(id);
            }
        }
        tracing::debug!(kind = %request.kind, request_id = %request.id, ?target, "Request sent");
        self.outbox.send(target, &GameMessage::Request(request));
    }

    async fn on_loader(&mut self, event: LoaderEvent) {
        let players = self.players().to_vec();
        for outcome in self.loader.on_event(event, &players).await {
            match outcome {
                LoaderOutcome::Activated(name) => {
                    // Only the new module's requests stay answerable.
                    if let Some(generation) = self.loader.live_generation() {
                        self.outstanding.retain_generation(generation);
                    }
                    // The roster goes out with the game so every projection
                    // starts the round from the same state bags.
                    if let Some(room) = self.room.as_mut() {
                        room.set_active_game(Some(name.clone()));
                        if !room.is_empty() {
                            self.outbox
                                .to_players(&GameMessage::PlayersInRoom(room.snapshot()));
                        }
                    }
                    self.outbox.to_players(&GameMessage::LoadGame(name.clone()));
                    self.notify(HostNotice::ModuleActivated(name));
                }
                LoaderOutcome::Failed { name, error } => {
                    tracing::error!(game = %name, error = %error, "Game module failed");
                    if let Some(room) = self.room.as_mut() {
                        room.set_active_game(None);
                    }
                    self.outstanding.clear();
                    self.notify(HostNotice::ModuleFailed {
                        name,
                        error: error.to_string(),
                    });
                }
                LoaderOutcome::Unloaded(name) => {
                    if let Some(room) = self.room.as_mut() {
                        room.set_active_game(None);
                    }
                    self.outstanding.clear();
                    self.notify(HostNotice::ModuleUnloaded(name));
                }
            }
        }
    }
}
