//! Player-side module for games whose whole UI is host requests.
//!
//! Requests go through the dispatcher no matter which module is active, so
//! the screen belongs to the session. The module only owns local audio.

use async_trait::async_trait;

use partyline_domain::{GameName, Player};

use super::{GameModule, ModuleContext, ModuleError, ModuleEvent};

pub struct ScreenModule {
    name: GameName,
    ctx: ModuleContext,
}

impl ScreenModule {
    pub fn new(name: GameName, ctx: ModuleContext) -> Self {
        Self { name, ctx }
    }
}

#[async_trait]
impl GameModule for ScreenModule {
    fn name(&self) -> &GameName {
        &self.name
    }

    async fn start(&mut self, _players: &[Player]) -> Result<(), ModuleError> {
        tracing::debug!(game = %self.name, "Screen module started");
        Ok(())
    }

    async fn end(&mut self) {
        self.ctx.audio().stop_all();
    }

    async fn on_event(&mut self, _event: ModuleEvent) {}
}
