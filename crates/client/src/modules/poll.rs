//! Host poll: one `buttonselect` per player, one counted vote each, then a
//! timed announcement with an effect and a ducking narrator cue.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use partyline_domain::{AudioCategory, ConnectionId, GameName, Player};
use partyline_shared::{AudioCue, ButtonOption, ButtonSelectPayload, Request};

use super::{GameModule, ModuleContext, ModuleError, ModuleEvent};

const CLOSE_TIMER: &str = "close";
const VOTE_EFFECT: &str = "vote";
const RESULT_EFFECT: &str = "tada";
const RESULT_NARRATION: &str = "results";
const RESULT_SECONDS: u32 = 5;

pub struct PollModule {
    name: GameName,
    ctx: ModuleContext,
    prompt: String,
    options: Vec<ButtonOption>,
    voting_window: Duration,
    expected: HashSet<ConnectionId>,
    votes: HashMap<ConnectionId, String>,
    announced: bool,
}

impl PollModule {
    pub fn new(name: GameName, ctx: ModuleContext) -> Self {
        Self {
            name,
            ctx,
            prompt: "Cats or dogs?".to_string(),
            options: vec![
                ButtonOption::labeled("a", "Cats"),
                ButtonOption::labeled("b", "Dogs"),
            ],
            voting_window: Duration::from_secs(60),
            expected: HashSet::new(),
            votes: HashMap::new(),
            announced: false,
        }
    }

    pub fn with_question(mut self, prompt: impl Into<String>, options: Vec<ButtonOption>) -> Self {
        self.prompt = prompt.into();
        self.options = options;
        self
    }

    pub fn with_voting_window(mut self, window: Duration) -> Self {
        self.voting_window = window;
        self
    }

    fn ballot(&self) -> Request {
        Request::button_select(
            ButtonSelectPayload::new(self.options.clone()).with_prompt(self.prompt.clone()),
        )
    }

    /// Votes per option token, in option order.
    fn tally(&self) -> BTreeMap<usize, (String, usize)> {
        let mut tally = BTreeMap::new();
        for (index, option) in self.options.iter().enumerate() {
            let count = self
                .votes
                .values()
                .filter(|vote| vote.as_str() == option.token())
                .count();
            tally.insert(index, (option.display_label().to_string(), count));
        }
        tally
    }

    fn everyone_voted(&self) -> bool {
        !self.votes.is_empty() && self.expected.iter().all(|id| self.votes.contains_key(id))
    }

    fn record_vote(&mut self, from: ConnectionId, value: Value) {
        if self.announced {
            tracing::debug!(player = %from, "Vote after results ignored");
            return;
        }
        if self.votes.contains_key(&from) {
            tracing::debug!(player = %from, "Second vote ignored");
            return;
        }
        let Some(token) = value.as_str().map(str::to_string) else {
            tracing::warn!(player = %from, value = %value, "Vote is not a string");
            return;
        };
        if !self.options.iter().any(|o| o.token() == token) {
            tracing::warn!(player = %from, token = %token, "Vote for unknown option");
            return;
        }

        tracing::info!(player = %from, token = %token, "Vote recorded");
        self.ctx.update_player(from, "vote", Value::String(token.clone()));
        self.ctx.audio().play(AudioCategory::Effect, VOTE_EFFECT);
        self.votes.insert(from, token);

        if self.everyone_voted() {
            self.announce();
        }
    }

    fn announce(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;

        let tally = self.tally();
        let winner = tally
            .values()
            .max_by_key(|(_, count)| *count)
            .map(|(label, _)| label.clone())
            .unwrap_or_default();
        let results: Vec<Value> = tally
            .values()
            .map(|(label, count)| json!({"label": label, "votes": count}))
            .collect();
        let payload = json!({
            "title": self.prompt,
            "text": format!("{} wins!", winner),
            "results": results,
        });

        tracing::info!(winner = %winner, votes = self.votes.len(), "Poll closed");
        self.ctx.set_phase("results");
        self.ctx
            .request_all(Request::timed_message(payload.clone(), RESULT_SECONDS));
        self.ctx.display(Request::message(payload));
        self.ctx
            .broadcast_audio(AudioCue::new(AudioCategory::Effect, RESULT_EFFECT));
        self.ctx.broadcast_audio(
            AudioCue::new(AudioCategory::Narrator, RESULT_NARRATION).ducking(),
        );
    }
}

#[async_trait]
impl GameModule for PollModule {
    fn name(&self) -> &GameName {
        &self.name
    }

    async fn start(&mut self, players: &[Player]) -> Result<(), ModuleError> {
        if self.options.is_empty() {
            return Err(ModuleError::Start {
                name: self.name.clone(),
                reason: "poll has no options".into(),
            });
        }
        self.expected = players.iter().map(Player::connection_id).collect();
        self.ctx.set_phase("voting");
        self.ctx.request_all(self.ballot());
        self.ctx.display(Request::message(json!({
            "title": self.prompt,
            "text": "Vote on your phone"
        })));
        self.ctx.schedule(CLOSE_TIMER, self.voting_window);
        Ok(())
    }

    async fn end(&mut self) {
        self.ctx.audio().fade_out(AudioCategory::Narrator);
        self.ctx.audio().fade_out(AudioCategory::Effect);
        self.ctx.clear_screen();
    }

    async fn on_event(&mut self, event: ModuleEvent) {
        match event {
            ModuleEvent::Response { from, value, .. } => self.record_vote(from, value),
            ModuleEvent::PlayerJoined(player) => {
                if self.announced {
                    return;
                }
                let id = player.connection_id();
                if self.expected.insert(id) {
                    self.ctx.request_player(id, self.ballot());
                }
            }
            ModuleEvent::PlayerLeft(id) => {
                self.expected.remove(&id);
                if !self.announced && self.everyone_voted() {
                    self.announce();
                }
            }
            ModuleEvent::Timer(tag) if tag == CLOSE_TIMER => self.announce(),
            ModuleEvent::Timer(tag) => tracing::trace!(tag = %tag, "Unknown timer ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioSequencer, SimulatedOutput, TrackCatalog};
    use crate::modules::{ModuleCommand, ModuleMessage, RequestTarget};
    use crate::settings::AudioSettings;
    use partyline_domain::{PlayerName, PlayerProfile, RequestId, Role};
    use partyline_shared::{request_types, GameMessage, Target};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn player(name: &str) -> Player {
        Player::new(
            ConnectionId::new(),
            PlayerProfile::new(PlayerName::new(name).unwrap()),
        )
    }

    fn poll() -> (PollModule, mpsc::UnboundedReceiver<ModuleMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = AudioSequencer::spawn(
            Arc::new(SimulatedOutput::new(TrackCatalog::new())),
            TrackCatalog::new(),
            AudioSettings::default(),
        );
        let ctx = ModuleContext::new(Role::Host, audio, tx)
            .for_module(GameName::new("poll").unwrap(), 1);
        (PollModule::new(GameName::new("poll").unwrap(), ctx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ModuleMessage>) -> Vec<ModuleCommand> {
        let mut commands = Vec::new();
        while let Ok(message) = rx.try_recv() {
            commands.push(message.command);
        }
        commands
    }

    fn vote(from: ConnectionId, token: &str) -> ModuleEvent {
        ModuleEvent::Response {
            from,
            request_id: RequestId::new(),
            value: json!(token),
        }
    }

    fn announced(commands: &[ModuleCommand]) -> bool {
        commands.iter().any(|c| {
            matches!(c, ModuleCommand::Request { to: RequestTarget::AllPlayers, request }
                if request.kind == request_types::TIMED_MESSAGE)
        })
    }

    #[tokio::test]
    async fn start_sends_ballot_to_everyone() {
        let (mut poll, mut rx) = poll();
        poll.start(&[player("Ada"), player("Bo")]).await.unwrap();

        let commands = drain(&mut rx);
        assert!(commands.contains(&ModuleCommand::SetPhase(Some("voting".into()))));
        assert!(commands.iter().any(|c| matches!(c,
            ModuleCommand::Request { to: RequestTarget::AllPlayers, request } if request.expects_response())));
    }

    #[tokio::test]
    async fn each_player_counts_once_and_results_follow_last_vote() {
        let (mut poll, mut rx) = poll();
        let (ada, bo) = (player("Ada"), player("Bo"));
        poll.start(&[ada.clone(), bo.clone()]).await.unwrap();
        drain(&mut rx);

        poll.on_event(vote(ada.connection_id(), "b")).await;
        poll.on_event(vote(ada.connection_id(), "a")).await;
        let commands = drain(&mut rx);
        assert_eq!(
            commands,
            vec![ModuleCommand::UpdatePlayer {
                player: ada.connection_id(),
                key: "vote".into(),
                value: json!("b")
            }]
        );

        poll.on_event(vote(bo.connection_id(), "b")).await;
        let commands = drain(&mut rx);
        assert!(announced(&commands));
        assert!(commands.contains(&ModuleCommand::SetPhase(Some("results".into()))));
        assert!(commands.contains(&ModuleCommand::Send {
            to: Target::Players,
            message: GameMessage::AudioPlay(
                AudioCue::new(AudioCategory::Narrator, RESULT_NARRATION).ducking()
            ),
        }));
        let display = commands.iter().find_map(|c| match c {
            ModuleCommand::Display(request) => Some(request.payload.clone()),
            _ => None,
        });
        assert_eq!(display.expect("display")["text"], "Dogs wins!");
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_votes() {
        let (mut poll, mut rx) = poll();
        let ada = player("Ada");
        poll.start(&[ada.clone()]).await.unwrap();
        drain(&mut rx);

        poll.on_event(vote(ada.connection_id(), "z")).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn late_joiner_gets_ballot_and_leaver_is_not_waited_for() {
        let (mut poll, mut rx) = poll();
        let (ada, bo, cy) = (player("Ada"), player("Bo"), player("Cy"));
        poll.start(&[ada.clone(), bo.clone()]).await.unwrap();
        drain(&mut rx);

        poll.on_event(ModuleEvent::PlayerJoined(cy.clone())).await;
        assert!(drain(&mut rx).iter().any(|c| matches!(c,
            ModuleCommand::Request { to: RequestTarget::Player(id), .. } if *id == cy.connection_id())));

        poll.on_event(vote(ada.connection_id(), "a")).await;
        poll.on_event(vote(cy.connection_id(), "a")).await;
        assert!(!announced(&drain(&mut rx)));

        poll.on_event(ModuleEvent::PlayerLeft(bo.connection_id())).await;
        assert!(announced(&drain(&mut rx)));
    }

    #[tokio::test]
    async fn close_timer_announces_partial_results() {
        let (mut poll, mut rx) = poll();
        let (ada, bo) = (player("Ada"), player("Bo"));
        poll.start(&[ada.clone(), bo]).await.unwrap();
        poll.on_event(vote(ada.connection_id(), "a")).await;
        drain(&mut rx);

        poll.on_event(ModuleEvent::Timer(CLOSE_TIMER.into())).await;
        assert!(announced(&drain(&mut rx)));

        poll.on_event(ModuleEvent::Timer(CLOSE_TIMER.into())).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn end_clears_the_screen() {
        let (mut poll, mut rx) = poll();
        poll.start(&[]).await.unwrap();
        drain(&mut rx);

        poll.end().await;
        assert_eq!(drain(&mut rx), vec![ModuleCommand::ClearScreen]);
    }
}
