//! Host lobby: music and joining instructions while no game runs.

use async_trait::async_trait;
use serde_json::json;

use partyline_domain::{AudioCategory, GameName, Player};
use partyline_shared::Request;

use super::{GameModule, ModuleContext, ModuleError, ModuleEvent};

const LOBBY_TRACK: &str = "lobby";

const STYLESHEET: &str = ".lobby { display: grid; place-items: center; }";

pub struct LobbyModule {
    name: GameName,
    ctx: ModuleContext,
}

impl LobbyModule {
    pub fn new(name: GameName, ctx: ModuleContext) -> Self {
        Self { name, ctx }
    }

    fn instructions() -> Request {
        Request::instructions(json!({
            "title": "You're in!",
            "text": "Watch the big screen. The game starts soon."
        }))
    }
}

#[async_trait]
impl GameModule for LobbyModule {
    fn name(&self) -> &GameName {
        &self.name
    }

    fn stylesheet(&self) -> Option<&str> {
        Some(STYLESHEET)
    }

    async fn start(&mut self, players: &[Player]) -> Result<(), ModuleError> {
        self.ctx.audio().play(AudioCategory::Music, LOBBY_TRACK);
        self.ctx.set_phase("waiting");
        self.ctx.request_all(Self::instructions());
        self.ctx.display(Request::message(json!({
            "text": "Join on your phone",
            "players": players.len()
        })));
        Ok(())
    }

    async fn end(&mut self) {
        self.ctx.audio().fade_out(AudioCategory::Music);
        self.ctx.clear_screen();
    }

    async fn on_event(&mut self, event: ModuleEvent) {
        if let ModuleEvent::PlayerJoined(player) = event {
            tracing::debug!(player = %player.name(), "Sending lobby instructions to late joiner");
            self.ctx
                .request_player(player.connection_id(), Self::instructions());
        }
    }
}
