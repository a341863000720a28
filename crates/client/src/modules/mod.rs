//! Game modules: the per-game logic the host and players swap at runtime.
//!
//! A module is a [`GameModule`] trait object built by a named factory in the
//! [`ModuleRegistry`]. The [`ModuleLoader`] owns at most one active module
//! and serializes the load/unload transitions. Modules talk to the session
//! only through their [`ModuleContext`].

mod context;
mod lobby;
mod loader;
mod poll;
mod registry;
mod screen;

use async_trait::async_trait;
use serde_json::Value;

use partyline_domain::{ConnectionId, GameName, Player, RequestId};

pub use context::{ModuleCommand, ModuleContext, ModuleMessage, RequestTarget};
pub use lobby::LobbyModule;
pub use loader::{
    LoaderEvent, LoaderOutcome, LoaderPhase, LogStylesheets, ModuleLoader, StylesheetHost,
};
pub use poll::PollModule;
pub use registry::{ModuleFactory, ModuleFuture, ModuleRegistry};
pub use screen::ScreenModule;

#[cfg(test)]
pub use loader::MockStylesheetHost;

/// Something that happened in the session and concerns the active module.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    PlayerJoined(Player),
    PlayerLeft(ConnectionId),
    /// An accepted answer to an outstanding request.
    Response {
        from: ConnectionId,
        request_id: RequestId,
        value: Value,
    },
    /// A timer scheduled with `ModuleContext::schedule` fired.
    Timer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("No game module named '{0}'")]
    Unknown(GameName),
    #[error("Failed to construct game module '{name}': {reason}")]
    Construct { name: GameName, reason: String },
    #[error("Game module '{name}' failed to start: {reason}")]
    Start { name: GameName, reason: String },
}

/// Contract every game module implements.
///
/// `start` wires up whatever the module needs; `end` must fully reverse it,
/// stopping the module's audio and clearing what it rendered. The loader
/// calls `end` exactly once for every module whose construction succeeded.
#[async_trait]
pub trait GameModule: Send {
    fn name(&self) -> &GameName;

    /// CSS attached while the module is active.
    fn stylesheet(&self) -> Option<&str> {
        None
    }

    /// `players` is the room roster at the time the load began.
    async fn start(&mut self, players: &[Player]) -> Result<(), ModuleError>;

    async fn end(&mut self);

    async fn on_event(&mut self, event: ModuleEvent);
}
