use super::*;
use crate::audio::{SimulatedOutput, TrackCatalog, TrackSpec};
use crate::modules::ScreenModule;
use crate::settings::AudioSettings;
use partyline_domain::{AudioCategory, PlayerName};
use partyline_shared::{AudioCue, ButtonOption, ButtonSelectPayload, Request};
use serde_json::json;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn game(name: &str) -> GameName {
    GameName::new(name).unwrap()
}

fn code() -> RoomCode {
    RoomCode::new("WXYZ").unwrap()
}

fn member(id: ConnectionId, name: &str) -> Player {
    Player::new(id, PlayerProfile::new(PlayerName::new(name).unwrap()))
}

struct Harness {
    relay: mpsc::UnboundedSender<RelayEvent>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
    player: PlayerHandle,
    output: Arc<SimulatedOutput>,
    me: ConnectionId,
    host_id: ConnectionId,
}

fn harness() -> Harness {
    let registry = ModuleRegistry::new()
        .with(game("lobby"), |ctx| ScreenModule::new(game("lobby"), ctx))
        .with(game("poll"), |ctx| ScreenModule::new(game("poll"), ctx));
    let catalog = TrackCatalog::new()
        .with_track("lobby", TrackSpec::default())
        .with_track("results", TrackSpec::default());
    let output = Arc::new(SimulatedOutput::new(catalog.clone()));
    let audio = AudioSequencer::spawn(output.clone(), catalog, AudioSettings::default());

    let profile = PlayerProfile::new(PlayerName::new("Ada").unwrap());
    let config = PlayerConfig::new(code(), profile, registry);
    let (outbox, frames) = Outbox::channel();
    let (relay, relay_rx) = mpsc::unbounded_channel();
    let (player, _task) = PlayerClient::spawn(config, outbox, relay_rx, audio);

    Harness {
        relay,
        frames,
        player,
        output,
        me: ConnectionId::new(),
        host_id: ConnectionId::new(),
    }
}

impl Harness {
    fn frame(&self, frame: RelayFrame) {
        self.relay.send(RelayEvent::Frame(frame)).unwrap();
    }

    fn from(&self, from: ConnectionId, message: GameMessage) {
        self.frame(RelayFrame::Message {
            from,
            message: message.to_value().unwrap(),
        });
    }

    fn from_host(&self, message: GameMessage) {
        self.from(self.host_id, message);
    }

    async fn next_frame(&mut self) -> ClientFrame {
        tokio::time::timeout(RECV_TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("outbox closed")
    }

    /// Game messages sent since the last call.
    async fn sent(&mut self) -> Vec<(Target, GameMessage)> {
        self.player.snapshot().await.expect("snapshot");
        let mut sent = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            if let ClientFrame::Send { to, message } = frame {
                sent.push((to, GameMessage::from_value(message).unwrap()));
            }
        }
        sent
    }

    async fn view(&self) -> PlayerView {
        self.player.snapshot().await.expect("snapshot")
    }

    /// Connect, join the room with the host present and drain the join.
    async fn enter(&mut self) -> PlayerProfile {
        self.relay.send(RelayEvent::Connected).unwrap();
        assert_eq!(
            self.next_frame().await,
            ClientFrame::JoinRoom {
                room: code(),
                role: Role::Player,
            }
        );
        self.frame(RelayFrame::RoomJoined {
            room: code(),
            connection_id: self.me,
            role: Role::Player,
            peers: vec![PeerInfo {
                connection_id: self.host_id,
                role: Role::Host,
            }],
        });
        match &self.sent().await[..] {
            [(Target::Host, GameMessage::Join(profile))] => profile.clone(),
            other => panic!("expected a join, got {:?}", other),
        }
    }
}

fn ballot() -> Request {
    Request::button_select(ButtonSelectPayload::new(vec![
        ButtonOption::new("W"),
        ButtonOption::new("X"),
        ButtonOption::new("Y"),
        ButtonOption::new("Z"),
    ]))
}

#[tokio::test]
async fn joins_with_a_stable_credential() {
    let mut h = harness();
    let first = h.enter().await;
    assert_eq!(first.name.as_str(), "Ada");
    assert!(first.credential.is_some());

    // Reconnect: same credential, so the host can reunite us.
    h.relay.send(RelayEvent::Disconnected).unwrap();
    let again = h.enter().await;
    assert_eq!(again.credential, first.credential);
}

#[tokio::test]
async fn waits_for_the_host_before_announcing() {
    let mut h = harness();
    h.relay.send(RelayEvent::Connected).unwrap();
    h.next_frame().await;
    h.frame(RelayFrame::RoomJoined {
        room: code(),
        connection_id: h.me,
        role: Role::Player,
        peers: vec![],
    });
    assert!(h.sent().await.is_empty());
    assert!(!h.view().await.host_present);

    h.frame(RelayFrame::Connect {
        connection_id: h.host_id,
        role: Role::Host,
    });
    assert!(matches!(&h.sent().await[..], [(Target::Host, GameMessage::Join(_))]));
    assert!(h.view().await.host_present);
}

#[tokio::test]
async fn roster_projection_follows_the_host() {
    let mut h = harness();
    h.enter().await;
    let other = ConnectionId::new();

    h.from_host(GameMessage::PlayersInRoom(vec![member(h.me, "Ada"), member(other, "Bo")]));
    let view = h.view().await;
    assert_eq!(view.players.len(), 2);
    assert_eq!(view.me().map(|p| p.name().as_str()), Some("Ada"));

    let mut renamed = member(other, "Bo");
    renamed.set_state("vote", json!("W"));
    h.from_host(GameMessage::AddPlayer(renamed));
    let late = ConnectionId::new();
    h.from_host(GameMessage::AddPlayer(member(late, "Cy")));
    let view = h.view().await;
    assert_eq!(view.players.len(), 3);
    assert_eq!(view.players[1].state_value("vote"), Some(&json!("W")));

    h.from_host(GameMessage::PlayerDisconnect(other));
    let names: Vec<_> = h
        .view()
        .await
        .players
        .iter()
        .map(|p| p.name().as_str().to_string())
        .collect();
    assert_eq!(names, ["Ada", "Cy"]);
}

#[tokio::test]
async fn messages_from_other_players_are_ignored() {
    let mut h = harness();
    h.enter().await;

    let impostor = ConnectionId::new();
    h.from(impostor, GameMessage::PlayersInRoom(vec![member(impostor, "Mallory")]));
    h.from(impostor, GameMessage::Request(Request::message("Give me your vote")));

    assert!(h.view().await.players.is_empty());
    assert!(h.player.screen().borrow().is_blank());
}

#[tokio::test]
async fn buttonselect_answers_the_host_exactly_once() {
    let mut h = harness();
    h.enter().await;
    let request = ballot();
    h.from_host(GameMessage::Request(request.clone()));
    h.view().await;

    assert!(matches!(&*h.player.screen().borrow(), Screen::Buttons { enabled: true, .. }));
    assert_eq!(h.player.select("Y").await, Ok(()));
    assert_eq!(h.player.select("Y").await, Err(SelectError::AlreadyAnswered));
    assert_eq!(h.player.select("Z").await, Err(SelectError::AlreadyAnswered));

    let sent = h.sent().await;
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (Target::Host, GameMessage::Response(response)) => {
            assert_eq!(response.request_id, request.id);
            assert_eq!(response.value, json!("Y"));
        }
        other => panic!("expected a response, got {:?}", other),
    }
}

#[tokio::test]
async fn newer_request_replaces_the_ballot() {
    let mut h = harness();
    h.enter().await;
    h.from_host(GameMessage::Request(ballot()));
    h.from_host(GameMessage::Request(Request::message("Too slow")));
    h.view().await;

    assert_eq!(h.player.select("W").await, Err(SelectError::NoActiveSelection));
    assert_eq!(*h.player.screen().borrow(), Screen::Message(json!("Too slow")));
    assert!(h.sent().await.is_empty());
}

#[tokio::test]
async fn loadgame_activates_the_module_once() {
    let mut h = harness();
    h.enter().await;
    let mut view = h.player.view();

    h.from_host(GameMessage::LoadGame(game("poll")));
    tokio::time::timeout(RECV_TIMEOUT, view.wait_for(|v| v.game == Some(game("poll"))))
        .await
        .expect("poll activated")
        .unwrap();

    // A catch-up repeat must not restart the module.
    h.from_host(GameMessage::AudioPlay(AudioCue::new(AudioCategory::Music, "lobby")));
    h.from_host(GameMessage::LoadGame(game("poll")));
    h.view().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.output.opened(), ["lobby"]);
    assert!(h.output.latest("lobby").unwrap().is_playing());
}

#[tokio::test]
async fn unknown_game_leaves_no_module() {
    let mut h = harness();
    h.enter().await;
    h.from_host(GameMessage::LoadGame(game("trivia")));
    h.view().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.view().await.game, None);
}

#[tokio::test]
async fn host_audio_cues_play_locally() {
    let mut h = harness();
    h.enter().await;
    h.from_host(GameMessage::AudioPlay(
        AudioCue::new(AudioCategory::Narrator, "results").ducking(),
    ));
    h.view().await;

    tokio::time::timeout(RECV_TIMEOUT, async {
        while h.output.latest("results").is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("narrator cue opened");
    assert!(h.output.latest("results").unwrap().is_playing());
}

#[tokio::test(start_paused = true)]
async fn unknown_room_is_retried() {
    let mut h = harness();
    h.relay.send(RelayEvent::Connected).unwrap();
    h.next_frame().await;
    h.frame(RelayFrame::error(ErrorCode::RoomNotFound, "no such room"));

    let started = tokio::time::Instant::now();
    assert!(matches!(h.frames.recv().await, Some(ClientFrame::JoinRoom { .. })));
    assert_eq!(started.elapsed(), JOIN_RETRY_DELAY);
}

#[tokio::test]
async fn host_leaving_is_tracked_and_shutdown_leaves_the_room() {
    let mut h = harness();
    h.enter().await;
    h.frame(RelayFrame::Disconnect {
        connection_id: h.host_id,
    });
    assert!(!h.view().await.host_present);

    h.player.shutdown();
    loop {
        match h.next_frame().await {
            ClientFrame::LeaveRoom => break,
            ClientFrame::Send { .. } => continue,
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
